use anyhow::Result;
use std::{env, path::PathBuf};

#[derive(Clone, Debug)]
pub struct Paths {
    pub config: PathBuf,
    pub store: PathBuf,
}

/// Application home: `$XDG_CONFIG_HOME/.recsync`, falling back to
/// `$HOME/.config/.recsync`.
pub fn recsync_home() -> Result<PathBuf> {
    let xdg = env::var_os("XDG_CONFIG_HOME");
    let base = xdg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env::var_os("HOME").unwrap_or_default()).join(".config"));
    Ok(base.join(".recsync"))
}

pub fn paths() -> Result<Paths> {
    let home = recsync_home()?;
    Ok(Paths {
        config: home.join("config.toml"),
        store: home.join("store"),
    })
}
