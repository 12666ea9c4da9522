use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File name of the sentinel written at the storage root once a repository
/// has been initialized.
pub const MARKER_FILE: &str = "INIT";

/// Existence-only sentinel recording that initialization has completed.
///
/// The file is always zero bytes; any content a user puts there is ignored.
#[derive(Debug, Clone)]
pub struct Marker {
    path: PathBuf,
}

impl Marker {
    pub fn new(storage: &Path) -> Self {
        Self {
            path: storage.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Create the marker (and the storage directory, if needed).
    pub fn write(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(&self.path)?;
        Ok(())
    }

    /// Remove the marker. A missing marker is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Write the marker and return a guard that removes it again when
    /// dropped, unless [`PendingMarker::keep`] is called first.
    ///
    /// The guard also fires when the future holding it is dropped, so a
    /// cancelled initialization never leaves a marker behind.
    pub fn write_pending(&self) -> io::Result<PendingMarker<'_>> {
        self.write()?;
        Ok(PendingMarker {
            marker: self,
            keep: false,
        })
    }
}

/// A marker whose history entry has not been confirmed yet.
#[must_use = "dropping a PendingMarker removes the marker"]
pub struct PendingMarker<'a> {
    marker: &'a Marker,
    keep: bool,
}

impl PendingMarker<'_> {
    /// The marker's commit went through; leave the file in place.
    pub fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PendingMarker<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = self.marker.remove() {
            warn!(path = %self.marker.path.display(), error = %e, "failed to roll back marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_creates_empty_file_and_parent() {
        let td = tempdir().unwrap();
        let storage = td.path().join("nested").join("store");
        let m = Marker::new(&storage);
        assert!(!m.exists());

        m.write().unwrap();
        assert!(m.exists());
        assert_eq!(fs::metadata(m.path()).unwrap().len(), 0);
    }

    #[test]
    fn content_is_ignored() {
        let td = tempdir().unwrap();
        fs::write(td.path().join(MARKER_FILE), "anything").unwrap();
        assert!(Marker::new(td.path()).exists());
    }

    #[test]
    fn directory_named_init_is_not_a_marker() {
        let td = tempdir().unwrap();
        fs::create_dir(td.path().join(MARKER_FILE)).unwrap();
        assert!(!Marker::new(td.path()).exists());
    }

    #[test]
    fn remove_tolerates_missing_marker() {
        let td = tempdir().unwrap();
        let m = Marker::new(td.path());
        m.remove().unwrap();
        m.write().unwrap();
        m.remove().unwrap();
        assert!(!m.exists());
    }

    #[test]
    fn pending_marker_is_removed_unless_kept() {
        let td = tempdir().unwrap();
        let m = Marker::new(td.path());

        let pending = m.write_pending().unwrap();
        assert!(m.exists());
        drop(pending);
        assert!(!m.exists());

        m.write_pending().unwrap().keep();
        assert!(m.exists());
    }
}
