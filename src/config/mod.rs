mod edit;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::SyncError;
use crate::paths::Paths;

pub use edit::cmd_config_edit;

/// Top-level configuration structure loaded from `config.toml`.
///
/// Example TOML:
/// ```toml
/// path = "/home/me/records"
///
/// [vcs]
/// backend        = "jj"
/// remote_sync    = true
/// remote         = "origin"
/// remote_url     = "git@example.com:me/records.git"
/// default_branch = "main"
/// colocate       = true
/// ```
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Storage directory. Relative paths are taken relative to the
    /// directory holding `config.toml`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub vcs: VcsConfig,
}

/// Raw `[vcs]` table. Everything is optional; see [`VcsConfig::default`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VcsConfig {
    pub backend: String,
    pub remote_sync: bool,
    pub remote: String,
    pub remote_url: Option<String>,
    pub default_branch: String,
    pub colocate: bool,
    pub command_timeout_secs: Option<u64>,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            backend: "git".to_string(),
            remote_sync: false,
            remote: "origin".to_string(),
            remote_url: None,
            default_branch: "main".to_string(),
            colocate: false,
            command_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Git,
    Jj,
}

impl FromStr for BackendKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(BackendKind::Git),
            "jj" | "jujutsu" => Ok(BackendKind::Jj),
            _ => Err(SyncError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Git => f.write_str("git"),
            BackendKind::Jj => f.write_str("jj"),
        }
    }
}

/// Backend settings after validation. Built once at startup and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub storage: PathBuf,
    pub remote_sync: bool,
    pub remote: String,
    pub remote_url: Option<String>,
    pub default_branch: String,
    pub colocate: bool,
    pub command_timeout: Option<Duration>,
}

impl BackendConfig {
    /// A local-only configuration with default names.
    pub fn local(kind: BackendKind, storage: impl Into<PathBuf>) -> Self {
        let d = VcsConfig::default();
        Self {
            kind,
            storage: storage.into(),
            remote_sync: false,
            remote: d.remote,
            remote_url: None,
            default_branch: d.default_branch,
            colocate: false,
            command_timeout: None,
        }
    }

    /// `<branch>@<remote>`, the remote trunk that local work rebases onto.
    pub fn remote_trunk(&self) -> String {
        format!("{}@{}", self.default_branch, self.remote)
    }
}

impl Config {
    /// Validate and resolve into a [`BackendConfig`].
    ///
    /// # Errors
    /// [`SyncError::UnsupportedBackend`] if `vcs.backend` names neither `git`
    /// nor `jj`.
    pub fn resolve(&self, p: &Paths) -> Result<BackendConfig, SyncError> {
        let kind: BackendKind = self.vcs.backend.parse()?;
        let storage = match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => p
                .config
                .parent()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.clone()),
            None => p.store.clone(),
        };
        Ok(BackendConfig {
            kind,
            storage,
            remote_sync: self.vcs.remote_sync,
            remote: self.vcs.remote.clone(),
            remote_url: self.vcs.remote_url.clone().filter(|u| !u.trim().is_empty()),
            default_branch: self.vcs.default_branch.clone(),
            colocate: self.vcs.colocate,
            command_timeout: self.vcs.command_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Load and parse `config.toml` at `path`.
///
/// A missing file yields the default configuration (git backend, no remote).
///
/// # Errors
/// - Returns an error if the file exists but cannot be read.
/// - Returns an error if parsing the TOML fails.
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let cfg: Config = toml::from_str(&txt)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

/// CLI command: print the resolved backend configuration.
pub fn cmd_config_show(cfg: &BackendConfig, config_path: &Path) -> Result<()> {
    println!("config:         {}", config_path.display());
    println!("backend:        {}", cfg.kind);
    println!("storage:        {}", cfg.storage.display());
    println!("remote_sync:    {}", cfg.remote_sync);
    println!("remote:         {}", cfg.remote);
    println!(
        "remote_url:     {}",
        cfg.remote_url.as_deref().unwrap_or("-")
    );
    println!("default_branch: {}", cfg.default_branch);
    if cfg.kind == BackendKind::Jj {
        println!("colocate:       {}", cfg.colocate);
    }
    if let Some(t) = cfg.command_timeout {
        println!("timeout:        {}s", t.as_secs());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths_in(dir: &Path) -> Paths {
        Paths {
            config: dir.join("config.toml"),
            store: dir.join("store"),
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_config(&td.path().join("config.toml")).unwrap();
        let resolved = cfg.resolve(&paths_in(td.path())).unwrap();
        assert_eq!(
            resolved,
            BackendConfig::local(BackendKind::Git, td.path().join("store"))
        );
    }

    #[test]
    fn parses_full_vcs_table() {
        let td = tempdir().unwrap();
        let p = paths_in(td.path());
        fs::write(
            &p.config,
            r#"
path = "records"

[vcs]
backend = "jj"
remote_sync = true
remote = "upstream"
remote_url = "https://example.com/r.git"
default_branch = "trunk"
colocate = true
command_timeout_secs = 30
"#,
        )
        .unwrap();

        let cfg = load_config(&p.config).unwrap().resolve(&p).unwrap();
        assert_eq!(cfg.kind, BackendKind::Jj);
        assert_eq!(cfg.storage, td.path().join("records"));
        assert!(cfg.remote_sync);
        assert_eq!(cfg.remote, "upstream");
        assert_eq!(cfg.remote_url.as_deref(), Some("https://example.com/r.git"));
        assert_eq!(cfg.default_branch, "trunk");
        assert!(cfg.colocate);
        assert_eq!(cfg.command_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.remote_trunk(), "trunk@upstream");
    }

    #[test]
    fn unknown_backend_is_a_configuration_failure() {
        let td = tempdir().unwrap();
        let p = paths_in(td.path());
        fs::write(&p.config, "[vcs]\nbackend = \"hg\"\n").unwrap();
        let err = load_config(&p.config).unwrap().resolve(&p).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedBackend(ref s) if s == "hg"));
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let td = tempdir().unwrap();
        let p = paths_in(td.path());
        fs::write(&p.config, "[vcs\n").unwrap();
        let err = load_config(&p.config).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn blank_remote_url_is_treated_as_absent() {
        let td = tempdir().unwrap();
        let p = paths_in(td.path());
        fs::write(&p.config, "[vcs]\nremote_url = \"  \"\n").unwrap();
        let cfg = load_config(&p.config).unwrap().resolve(&p).unwrap();
        assert_eq!(cfg.remote_url, None);
    }
}
