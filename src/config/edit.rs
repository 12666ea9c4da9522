use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// CLI command: open `config.toml` in `$EDITOR` (default `vim`).
///
/// The current process is replaced by the editor, so this only returns on
/// failure.
pub fn cmd_config_edit(config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());

    let mut cmd = Command::new(&editor);
    cmd.arg(config_path);

    // vim: no swap file next to the config
    let is_vim = Path::new(&editor)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase().contains("vim"))
        .unwrap_or(false);
    if is_vim {
        cmd.arg("-n");
    }

    let err = cmd.exec();
    Err(err).context(format!("failed to launch editor: {}", editor))
}
