mod resolve;

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::executor::{Executor, SyncOperation, SyncOutcome};
use crate::progress::{err_style, ok_style, spinner, warn_style};

pub use resolve::resolve_record_paths;

/// CLI command: initialize the storage repository (no-op when already done).
pub async fn cmd_init(ex: &Executor) -> Result<ExitCode> {
    let storage = ex.vcs().storage().display().to_string();
    Ok(drive(
        ex,
        SyncOperation::Initialize,
        format!("initializing {}", storage),
        format!("initialized {} ({})", storage, ex.vcs().kind()),
    )
    .await)
}

/// CLI command: commit the given record files.
///
/// Paths are relative to the storage directory; absolute paths must point
/// inside it.
pub async fn cmd_commit(ex: &Executor, message: String, files: Vec<PathBuf>) -> Result<ExitCode> {
    let files = resolve_record_paths(ex.vcs().storage(), &files)?;
    Ok(drive(
        ex,
        SyncOperation::Commit {
            message: message.clone(),
            files,
        },
        format!("committing \"{}\"", message),
        format!("committed \"{}\"", message),
    )
    .await)
}

/// CLI command: reconcile local history with the remote.
pub async fn cmd_sync(ex: &Executor) -> Result<ExitCode> {
    Ok(drive(
        ex,
        SyncOperation::Synchronize,
        "synchronizing".to_string(),
        "synchronized".to_string(),
    )
    .await)
}

/// Launch `op`, spin until its outcome arrives, then render the outcome in
/// place of the spinner.
///
/// Ctrl-C cancels the operation (killing any running command) instead of
/// leaving it running behind the exiting process.
async fn drive(ex: &Executor, op: SyncOperation, running: String, done: String) -> ExitCode {
    let pb = spinner(running.clone());
    let handle = ex.spawn(op);

    let token = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = handle.outcome().await;
    ctrl_c.abort();

    match outcome {
        SyncOutcome::Done => {
            pb.set_style(ok_style());
            pb.finish_with_message(done);
            ExitCode::SUCCESS
        }
        SyncOutcome::NotInitialized => {
            pb.set_style(warn_style());
            pb.finish_with_message(format!(
                "{} is not initialized, run `recsync init` first",
                ex.vcs().storage().display()
            ));
            ExitCode::from(2)
        }
        SyncOutcome::Error { diagnostic, cause } => {
            pb.set_style(err_style());
            let summary = match cause.remote_phase() {
                Some(phase) => format!("{} ({} failed, local changes kept)", running, phase),
                None => format!("{} (error)", running),
            };
            pb.finish_with_message(summary);
            for line in diagnostic.lines() {
                eprintln!("  {}", line.dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
