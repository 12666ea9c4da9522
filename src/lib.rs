//! Crate entry point for **recsync**.
//!
//! recsync keeps a directory of record files under version control and
//! synchronizes it with a remote, using either `git` or `jj` as the backend.
//! The engine lives in [`vcs`] (backends and process invocation) and
//! [`executor`] (one-shot asynchronous operations with a single terminal
//! outcome). The remaining modules are the CLI that drives it.

pub mod config;
pub mod error;
pub mod executor;
mod list;
mod paths;
mod progress;
mod sync;
pub mod vcs;

pub use config::{BackendConfig, BackendKind, Config, load_config};
pub use error::{RemotePhase, SyncError};
pub use executor::{Executor, OperationHandle, SyncOperation, SyncOutcome};
pub use list::{cmd_contributors, cmd_whoami};
pub use paths::{Paths, paths, recsync_home};
pub use sync::{cmd_commit, cmd_init, cmd_sync};
pub use vcs::Vcs;
