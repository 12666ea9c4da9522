use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Resolve user-supplied record paths to paths relative to the storage root.
///
/// Commands run with the storage directory as their working directory, so
/// every path handed to a backend must be relative to it.
///
/// - Relative paths are taken as already relative to `storage`.
/// - Absolute paths must point inside `storage` and are stripped of it.
/// - `..` components that would escape the storage root are rejected.
pub fn resolve_record_paths(storage: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    files.iter().map(|f| resolve_one(storage, f)).collect()
}

fn resolve_one(storage: &Path, file: &Path) -> Result<PathBuf> {
    let rel = if file.is_absolute() {
        match file.strip_prefix(storage) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => bail!(
                "{} is outside the storage directory {}",
                file.display(),
                storage.display()
            ),
        }
    } else {
        file.to_path_buf()
    };

    let mut out = PathBuf::new();
    for c in rel.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    bail!("{} escapes the storage directory", file.display());
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("unexpected path component in {}", file.display())
            }
        }
    }
    if out.as_os_str().is_empty() {
        bail!("{} does not name a record", file.display());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_pass_through_normalized() {
        let got = resolve_record_paths(
            Path::new("/data/store"),
            &[PathBuf::from("./a/b.txt"), PathBuf::from("c/../d.txt")],
        )
        .unwrap();
        assert_eq!(got, vec![PathBuf::from("a/b.txt"), PathBuf::from("d.txt")]);
    }

    #[test]
    fn absolute_paths_inside_storage_are_stripped() {
        let got =
            resolve_record_paths(Path::new("/data/store"), &[PathBuf::from("/data/store/x.md")])
                .unwrap();
        assert_eq!(got, vec![PathBuf::from("x.md")]);
    }

    #[test]
    fn paths_outside_storage_are_rejected() {
        let storage = Path::new("/data/store");
        assert!(resolve_record_paths(storage, &[PathBuf::from("/etc/passwd")]).is_err());
        assert!(resolve_record_paths(storage, &[PathBuf::from("../x")]).is_err());
        assert!(resolve_record_paths(storage, &[PathBuf::from(".")]).is_err());
    }
}
