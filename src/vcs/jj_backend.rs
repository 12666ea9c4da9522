use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::marker::Marker;
use super::process::{CommandRunner, Tool};
use super::{Backend, INIT_COMMIT_MESSAGE, identity, parse_people};
use crate::config::{BackendConfig, BackendKind};
use crate::error::{RemotePhase, Result, SyncError};

const AUTHOR_TEMPLATE: &str = r#"author.name() ++ " <" ++ author.email() ++ ">\n""#;

static FILES_CHANGED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) files? changed").unwrap());

/// Working-copy backend driving the `jj` executable.
///
/// There is no staging area: `jj` snapshots the whole working copy on every
/// command, so the `files` argument of [`Backend::commit`] only matters to the
/// git backend. Bookmarks do not follow new commits on their own and are moved
/// explicitly before each push.
pub struct JjBackend {
    cfg: BackendConfig,
    jj: Tool,
    marker: Marker,
}

impl JjBackend {
    pub fn new(cfg: BackendConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let jj = Tool::new("jj", &cfg.storage, runner);
        let marker = Marker::new(&cfg.storage);
        Self { cfg, jj, marker }
    }

    async fn create_repo(&self) -> Result<()> {
        if self.cfg.storage.join(".jj").is_dir() {
            debug!("jj repository already present, skipping creation");
            return Ok(());
        }
        let mut args = vec!["git"];
        match self.cfg.remote_url.as_deref() {
            Some(url) if self.cfg.remote_sync => {
                args.push("clone");
                if self.cfg.colocate {
                    args.push("--colocate");
                }
                args.extend(["--remote", self.cfg.remote.as_str(), url, "."]);
            }
            _ => {
                if self.cfg.remote_sync {
                    warn!("remote sync enabled but no remote_url configured, initializing locally");
                }
                args.push("init");
                if self.cfg.colocate {
                    args.push("--colocate");
                }
            }
        }
        self.jj.run(args).await?;
        Ok(())
    }

    /// Record the marker in history, removing it again unless the commit
    /// goes through.
    async fn commit_marker(&self) -> Result<()> {
        let pending = self.marker.write_pending()?;
        self.jj.run(["commit", "-m", INIT_COMMIT_MESSAGE]).await?;
        pending.keep();
        Ok(())
    }

    async fn fetch_and_rebase(&self) -> Result<()> {
        self.jj
            .run(["git", "fetch", "--remote", self.cfg.remote.as_str()])
            .await
            .map_err(SyncError::remote(RemotePhase::Fetch))?;
        let trunk = self.cfg.remote_trunk();
        self.jj
            .run(["rebase", "-b", "@", "-d", trunk.as_str()])
            .await
            .map_err(SyncError::remote(RemotePhase::Rebase))?;
        Ok(())
    }

    /// Point the default bookmark at the revision just committed and push it.
    async fn publish(&self, allow_new: bool) -> Result<()> {
        let bookmark = self.cfg.default_branch.as_str();
        self.jj
            .run(["bookmark", "set", bookmark, "-r", "@-"])
            .await
            .map_err(SyncError::remote(RemotePhase::Bookmark))?;

        let mut push = vec![
            "git",
            "push",
            "--remote",
            self.cfg.remote.as_str(),
            "--bookmark",
            bookmark,
        ];
        if allow_new {
            push.push("--allow-new");
        }
        self.jj
            .run(push)
            .await
            .map_err(SyncError::remote(RemotePhase::Push))?;
        Ok(())
    }
}

/// Whether `jj diff --stat` output describes at least one changed file.
///
/// Depending on the version, an empty diff prints nothing or a
/// `0 files changed` summary.
fn stat_has_changes(stat: &str) -> bool {
    match FILES_CHANGED.captures_iter(stat).last() {
        Some(c) => c[1].parse::<u64>().map(|n| n > 0).unwrap_or(true),
        None => stat.lines().any(|l| !l.trim().is_empty()),
    }
}

#[async_trait]
impl Backend for JjBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Jj
    }

    fn storage(&self) -> &Path {
        &self.cfg.storage
    }

    async fn initialize(&self) -> Result<()> {
        if self.marker.exists() {
            debug!(storage = %self.cfg.storage.display(), "already initialized");
            return Ok(());
        }
        fs::create_dir_all(&self.cfg.storage)?;

        self.create_repo().await?;
        if self.marker.exists() {
            // cloned from a remote another machine already initialized
            info!(remote = %self.cfg.remote, "marker came with the clone, nothing to record");
            return Ok(());
        }
        self.commit_marker().await?;
        if self.cfg.remote_sync {
            self.publish(true).await?;
        }
        info!(storage = %self.cfg.storage.display(), colocate = self.cfg.colocate, "initialized jj storage");
        Ok(())
    }

    async fn commit(&self, message: &str, files: &[PathBuf]) -> Result<()> {
        if self.cfg.remote_sync {
            self.fetch_and_rebase().await?;
        }

        if !self.has_pending_change(files).await? {
            info!("nothing to commit");
            return Ok(());
        }

        self.jj.run(["commit", "-m", message]).await?;
        info!(summary = message, "committed");

        if self.cfg.remote_sync {
            self.publish(false).await?;
            info!(remote = %self.cfg.remote, "pushed");
        }
        Ok(())
    }

    async fn synchronize(&self) -> Result<()> {
        if !self.marker.exists() {
            return Err(SyncError::NotInitialized(self.cfg.storage.clone()));
        }
        if !self.cfg.remote_sync {
            debug!("remote sync disabled, nothing to fetch");
            return Ok(());
        }
        self.fetch_and_rebase().await?;
        info!(remote = %self.cfg.remote, "fetched and rebased");
        Ok(())
    }

    async fn has_pending_change(&self, _files: &[PathBuf]) -> Result<bool> {
        let out = self
            .jj
            .run(["diff", "--from", "@-", "--to", "@", "--stat"])
            .await?;
        Ok(stat_has_changes(&out.stdout))
    }

    fn current_user_identity(&self) -> Result<String> {
        let name = self.jj.run_blocking(["config", "get", "user.name"])?;
        let email = self.jj.run_blocking(["config", "get", "user.email"])?;
        Ok(identity(&name.stdout, &email.stdout))
    }

    fn all_contributors(&self) -> Result<BTreeSet<String>> {
        let out = self
            .jj
            .run_blocking(["log", "-r", "all()", "--no-graph", "-T", AUTHOR_TEMPLATE])?;
        Ok(parse_people(&out.stdout))
    }
}
