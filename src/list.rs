use anyhow::{Context, Result};
use colored::Colorize;

use crate::vcs::Vcs;

/// CLI command: print the configured user as `Name <email>`.
///
/// # Errors
/// - Returns an error if the backend has no user name or email configured.
pub fn cmd_whoami(vcs: &Vcs) -> Result<()> {
    let me = vcs
        .current_user_identity()
        .with_context(|| format!("failed to read {} user identity", vcs.kind()))?;
    println!("{}", me);
    Ok(())
}

/// CLI command: print every distinct author in the storage history.
///
/// The current user, if resolvable, is highlighted.
///
/// Example output:
/// ```text
/// - Ada Lovelace <ada@example.org>
/// - Charles Babbage <charles@example.org>
/// ```
///
/// # Errors
/// - Returns an error if the history cannot be read.
pub fn cmd_contributors(vcs: &Vcs) -> Result<()> {
    let people = vcs
        .all_contributors()
        .with_context(|| format!("failed to read history of {}", vcs.storage().display()))?;
    let me = vcs.current_user_identity().ok();
    for p in &people {
        if me.as_deref() == Some(p.as_str()) {
            println!("- {}", p.bold());
        } else {
            println!("- {}", p);
        }
    }
    Ok(())
}
