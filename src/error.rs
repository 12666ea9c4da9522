use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Which half of a remote reconciliation failed.
///
/// The local commit has already landed by the time any of these run, so
/// callers usually want to tell the user "committed, but could not share".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePhase {
    Fetch,
    Pull,
    Rebase,
    Bookmark,
    Push,
}

impl fmt::Display for RemotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemotePhase::Fetch => "fetch",
            RemotePhase::Pull => "pull",
            RemotePhase::Rebase => "rebase",
            RemotePhase::Bookmark => "bookmark",
            RemotePhase::Push => "push",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to start `{command}` in {}: {source}", .cwd.display())]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with status {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    #[error("{operation} task failed: {reason}")]
    TaskFailed { operation: String, reason: String },

    #[error("{phase} failed: {source}")]
    Remote {
        phase: RemotePhase,
        #[source]
        source: Box<SyncError>,
    },

    #[error("repository at {} is not initialized", .0.display())]
    NotInitialized(PathBuf),

    #[error("unsupported backend: {0} (expected \"git\" or \"jj\")")]
    UnsupportedBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SyncError {
    pub(crate) fn remote(phase: RemotePhase) -> impl FnOnce(SyncError) -> SyncError {
        move |source| SyncError::Remote {
            phase,
            source: Box::new(source),
        }
    }

    /// Captured tool output, if the failure came from a process that ran.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            SyncError::CommandFailed { output, .. } => Some(output),
            SyncError::Remote { source, .. } => source.captured_output(),
            _ => None,
        }
    }

    /// The remote phase that failed, if any.
    pub fn remote_phase(&self) -> Option<RemotePhase> {
        match self {
            SyncError::Remote { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
