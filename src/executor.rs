//! One-shot asynchronous units of work over a [`Vcs`].
//!
//! The caller spawns an operation, keeps rendering while it runs, and then
//! receives exactly one [`SyncOutcome`]. The outcome is produced even when the
//! operation fails, is cancelled, or its task panics.

use std::fmt;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::vcs::Vcs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperation {
    Initialize,
    Commit { message: String, files: Vec<PathBuf> },
    Synchronize,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Initialize => f.write_str("initialize"),
            SyncOperation::Commit { .. } => f.write_str("commit"),
            SyncOperation::Synchronize => f.write_str("synchronize"),
        }
    }
}

/// Terminal event of a [`SyncOperation`].
#[derive(Debug)]
pub enum SyncOutcome {
    Done,
    /// `diagnostic` is the captured tool output when a command ran, and the
    /// error message otherwise.
    Error {
        diagnostic: String,
        cause: SyncError,
    },
    /// Only produced for [`SyncOperation::Synchronize`].
    NotInitialized,
}

impl SyncOutcome {
    pub fn from_result(op: &SyncOperation, res: Result<()>) -> Self {
        match res {
            Ok(()) => SyncOutcome::Done,
            Err(SyncError::NotInitialized(_)) if *op == SyncOperation::Synchronize => {
                SyncOutcome::NotInitialized
            }
            Err(cause) => {
                let diagnostic = cause
                    .captured_output()
                    .map(|s| s.trim_end().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| cause.to_string());
                SyncOutcome::Error { diagnostic, cause }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SyncOutcome::Done)
    }
}

/// Run `op` to completion on the current task.
pub async fn run_operation(vcs: &Vcs, op: &SyncOperation) -> Result<()> {
    match op {
        SyncOperation::Initialize => vcs.initialize().await,
        SyncOperation::Commit { message, files } => vcs.commit(message, files).await,
        SyncOperation::Synchronize => vcs.synchronize().await,
    }
}

/// Launches operations as spawned tokio tasks.
///
/// Operations are not serialized here. Callers start the next operation only
/// after the previous outcome has arrived.
#[derive(Clone)]
pub struct Executor {
    vcs: Vcs,
}

impl Executor {
    pub fn new(vcs: Vcs) -> Self {
        Self { vcs }
    }

    pub fn vcs(&self) -> &Vcs {
        &self.vcs
    }

    pub fn spawn(&self, op: SyncOperation) -> OperationHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let vcs = self.vcs.clone();
        let name = op.to_string();

        let task = tokio::spawn(async move {
            debug!(operation = %op, "started");
            let res = tokio::select! {
                res = run_operation(&vcs, &op) => res,
                _ = token.cancelled() => Err(SyncError::Cancelled { operation: op.to_string() }),
            };
            let outcome = SyncOutcome::from_result(&op, res);
            debug!(operation = %op, ?outcome, "finished");
            outcome
        });

        OperationHandle { name, task, cancel }
    }
}

/// A running operation. Await [`OperationHandle::outcome`] for its result.
pub struct OperationHandle {
    name: String,
    task: JoinHandle<SyncOutcome>,
    cancel: CancellationToken,
}

impl OperationHandle {
    /// Stop the operation. A command that is still running is killed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this operation, for callers that hand the
    /// cancellation trigger to another task (e.g. a Ctrl-C listener).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn outcome(self) -> SyncOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(operation = %self.name, error = %e, "operation task did not complete");
                let cause = SyncError::TaskFailed {
                    operation: self.name,
                    reason: e.to_string(),
                };
                SyncOutcome::Error {
                    diagnostic: cause.to_string(),
                    cause,
                }
            }
        }
    }
}
