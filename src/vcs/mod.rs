//! Version-control integration layer.
//!
//! Two interchangeable backends sit behind the [`Backend`] trait:
//! `git_backend` (branch + staging area) and `jj_backend` (working copy +
//! bookmarks). The rest of the crate only talks to [`Vcs`], which binds one
//! backend at startup and forwards every call to it unchanged.

mod git_backend;
mod jj_backend;
mod marker;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;

pub use git_backend::GitBackend;
pub use jj_backend::JjBackend;
pub use marker::{MARKER_FILE, Marker, PendingMarker};
pub use process::{CmdOutput, CommandRunner, Invocation, ProcessRunner};

/// Message of the history entry that records the marker.
pub const INIT_COMMIT_MESSAGE: &str = "Initialize record storage";

/// Capabilities every backend provides.
///
/// Each external command is attempted exactly once per call; there are no
/// retries and no rollback beyond what an individual method documents.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn storage(&self) -> &Path;

    /// Create the repository unless the marker already exists.
    async fn initialize(&self) -> Result<()>;

    /// Record `files` under `message`. A no-op when nothing changed.
    async fn commit(&self, message: &str, files: &[PathBuf]) -> Result<()>;

    /// Bring local history in line with the remote.
    ///
    /// Fails with [`SyncError::NotInitialized`](crate::SyncError::NotInitialized)
    /// before touching the tool when the marker is absent.
    async fn synchronize(&self) -> Result<()>;

    /// Whether a commit of `files` would record anything.
    async fn has_pending_change(&self, files: &[PathBuf]) -> Result<bool>;

    /// `Name <email>` of the configured user.
    fn current_user_identity(&self) -> Result<String>;

    /// Every distinct `Name <email>` that authored a history entry.
    fn all_contributors(&self) -> Result<BTreeSet<String>>;
}

/// The backend selected for this process.
#[derive(Clone)]
pub struct Vcs {
    backend: Arc<dyn Backend>,
}

impl Vcs {
    /// Bind the backend named by `cfg.kind`, running commands through
    /// `runner`.
    pub fn new(cfg: &BackendConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let backend: Arc<dyn Backend> = match cfg.kind {
            BackendKind::Git => Arc::new(GitBackend::new(cfg.clone(), runner)),
            BackendKind::Jj => Arc::new(JjBackend::new(cfg.clone(), runner)),
        };
        Self { backend }
    }

    /// Bind the configured backend to real child processes.
    pub fn open(cfg: &BackendConfig) -> Self {
        let runner = ProcessRunner::new().with_timeout(cfg.command_timeout);
        Self::new(cfg, Arc::new(runner))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn storage(&self) -> &Path {
        self.backend.storage()
    }

    pub async fn initialize(&self) -> Result<()> {
        self.backend.initialize().await
    }

    pub async fn commit(&self, message: &str, files: &[PathBuf]) -> Result<()> {
        self.backend.commit(message, files).await
    }

    pub async fn synchronize(&self) -> Result<()> {
        self.backend.synchronize().await
    }

    pub fn current_user_identity(&self) -> Result<String> {
        self.backend.current_user_identity()
    }

    pub fn all_contributors(&self) -> Result<BTreeSet<String>> {
        self.backend.all_contributors()
    }
}

/// Format a `Name <email>` identity from the two config values.
pub(crate) fn identity(name: &str, email: &str) -> String {
    format!("{} <{}>", name.trim(), email.trim())
}

/// Collect `Name <email>` lines into a set.
///
/// Blank lines and entries with neither a name nor an email (the root commit
/// of a jj repository) are dropped.
pub(crate) fn parse_people(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "<>")
        .map(str::to_string)
        .collect()
}
