use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::marker::{MARKER_FILE, Marker};
use super::process::{CommandRunner, Tool};
use super::{Backend, INIT_COMMIT_MESSAGE, identity, parse_people};
use crate::config::{BackendConfig, BackendKind};
use crate::error::{RemotePhase, Result, SyncError};

/// Branch-and-staging-area backend driving the `git` executable.
pub struct GitBackend {
    cfg: BackendConfig,
    git: Tool,
    marker: Marker,
}

impl GitBackend {
    pub fn new(cfg: BackendConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let git = Tool::new("git", &cfg.storage, runner);
        let marker = Marker::new(&cfg.storage);
        Self { cfg, git, marker }
    }

    /// `git add --all -- <files>` and friends take paths as plain strings.
    fn pathspec(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect()
    }

    /// Add the configured remote unless one with that name already exists.
    async fn ensure_remote(&self) -> Result<()> {
        let Some(url) = self.cfg.remote_url.as_deref() else {
            warn!(remote = %self.cfg.remote, "remote sync enabled but no remote_url configured");
            return Ok(());
        };
        let out = self.git.run(["remote"]).await?;
        if out.stdout.lines().any(|l| l.trim() == self.cfg.remote) {
            debug!(remote = %self.cfg.remote, "remote already configured");
            return Ok(());
        }
        self.git
            .run(["remote", "add", self.cfg.remote.as_str(), url])
            .await?;
        Ok(())
    }

    /// Record the marker in history. The marker is removed again unless the
    /// commit goes through, so a later `initialize` starts over.
    async fn commit_marker(&self) -> Result<()> {
        let pending = self.marker.write_pending()?;
        self.git.run(["add", "--", MARKER_FILE]).await?;
        self.git.run(["commit", "-m", INIT_COMMIT_MESSAGE]).await?;
        pending.keep();
        Ok(())
    }

    async fn pull_rebase(&self) -> Result<()> {
        self.git
            .run([
                "pull",
                "--rebase",
                self.cfg.remote.as_str(),
                self.cfg.default_branch.as_str(),
            ])
            .await
            .map(|_| ())
            .map_err(SyncError::remote(RemotePhase::Pull))
    }

    async fn push(&self, set_upstream: bool) -> Result<()> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.push(&self.cfg.remote);
        args.push(&self.cfg.default_branch);
        self.git
            .run(args)
            .await
            .map(|_| ())
            .map_err(SyncError::remote(RemotePhase::Push))
    }
}

#[async_trait]
impl Backend for GitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Git
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

        let branch = format!("--initial-branch={}", self.cfg.default_branch);
        self.git.run(["init", branch.as_str()]).await?;
        if self.cfg.remote_sync {
            self.ensure_remote().await?;
        }
        self.commit_marker().await?;
        if self.cfg.remote_sync {
            self.push(true).await?;
        }
        info!(storage = %self.cfg.storage.display(), "initialized git storage");
        Ok(())
    }

    async fn commit(&self, message: &str, files: &[PathBuf]) -> Result<()> {
        let mut add = vec!["add".to_string(), "--all".to_string(), "--".to_string()];
        add.extend(Self::pathspec(files));
        self.git.run(&add).await?;

        if !self.has_pending_change(files).await? {
            info!("nothing to commit");
            return Ok(());
        }

        let mut commit = vec!["commit".to_string(), "-m".to_string(), message.to_string()];
        commit.push("--".to_string());
        commit.extend(Self::pathspec(files));
        self.git.run(&commit).await?;
        info!(summary = message, "committed");

        if self.cfg.remote_sync {
            self.pull_rebase().await?;
            self.push(false).await?;
            info!(remote = %self.cfg.remote, "pushed");
        }
        Ok(())
    }

    async fn synchronize(&self) -> Result<()> {
        if !self.marker.exists() {
            return Err(SyncError::NotInitialized(self.cfg.storage.clone()));
        }
        if !self.cfg.remote_sync {
            debug!("remote sync disabled, nothing to pull");
            return Ok(());
        }
        self.pull_rebase().await?;
        info!(remote = %self.cfg.remote, "pulled");
        Ok(())
    }

    async fn has_pending_change(&self, files: &[PathBuf]) -> Result<bool> {
        let mut diff = vec![
            "diff".to_string(),
            "--cached".to_string(),
            "--name-only".to_string(),
            "--".to_string(),
        ];
        diff.extend(Self::pathspec(files));
        let out = self.git.run(&diff).await?;
        Ok(!out.stdout.trim().is_empty())
    }

    fn current_user_identity(&self) -> Result<String> {
        let name = self.git.run_blocking(["config", "user.name"])?;
        let email = self.git.run_blocking(["config", "user.email"])?;
        Ok(identity(&name.stdout, &email.stdout))
    }

    fn all_contributors(&self) -> Result<BTreeSet<String>> {
        let out = self.git.run_blocking(["log", "--format=%an <%ae>"])?;
        Ok(parse_people(&out.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::testing::FakeRunner;
    use pretty_assertions::assert_eq;
    use tempfile::{TempDir, tempdir};

    fn backend(remote: bool) -> (TempDir, Arc<FakeRunner>, GitBackend) {
        let td = tempdir().unwrap();
        let mut cfg = BackendConfig::local(BackendKind::Git, td.path());
        if remote {
            cfg.remote_sync = true;
            cfg.remote_url = Some("https://example.com/r.git".into());
        }
        let fake = Arc::new(FakeRunner::new());
        let b = GitBackend::new(cfg, fake.clone());
        (td, fake, b)
    }

    #[tokio::test]
    async fn initialize_local_sequence() {
        let (_td, fake, b) = backend(false);
        b.initialize().await.unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                "git init --initial-branch=main".to_string(),
                "git add -- INIT".to_string(),
                format!("git commit -m {:?}", INIT_COMMIT_MESSAGE),
            ]
        );
        assert!(b.marker.exists());
    }

    #[tokio::test]
    async fn initialize_with_remote_adds_remote_and_pushes() {
        let (_td, fake, b) = backend(true);
        b.initialize().await.unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                "git init --initial-branch=main".to_string(),
                "git remote".to_string(),
                "git remote add origin https://example.com/r.git".to_string(),
                "git add -- INIT".to_string(),
                format!("git commit -m {:?}", INIT_COMMIT_MESSAGE),
                "git push --set-upstream origin main".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn initialize_keeps_existing_remote() {
        let (_td, fake, b) = backend(true);
        fake.stdout("git remote", "origin\n");
        b.initialize().await.unwrap();
        assert!(!fake.called("git remote add"));
    }

    #[tokio::test]
    async fn initialize_is_noop_when_marker_present() {
        let (_td, fake, b) = backend(true);
        b.marker.write().unwrap();
        b.initialize().await.unwrap();
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_marker_commit_removes_marker() {
        let (_td, fake, b) = backend(false);
        fake.fail("git commit", "Author identity unknown");
        let err = b.initialize().await.unwrap_err();
        assert_eq!(err.captured_output(), Some("Author identity unknown"));
        assert!(!b.marker.exists());
    }

    #[tokio::test]
    async fn failed_initial_push_keeps_marker() {
        let (_td, fake, b) = backend(true);
        fake.fail("git push", "could not read from remote");
        let err = b.initialize().await.unwrap_err();
        assert_eq!(err.remote_phase(), Some(RemotePhase::Push));
        assert!(b.marker.exists());
    }

    #[tokio::test]
    async fn commit_without_staged_change_skips_commit() {
        let (_td, fake, b) = backend(true);
        b.commit("add hello", &[PathBuf::from("hello.txt")])
            .await
            .unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                "git add --all -- hello.txt".to_string(),
                "git diff --cached --name-only -- hello.txt".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn commit_local_never_touches_network() {
        let (_td, fake, b) = backend(false);
        fake.stdout("git diff --cached", "hello.txt\n");
        b.commit("add hello", &[PathBuf::from("hello.txt")])
            .await
            .unwrap();
        assert!(fake.called(r#"git commit -m "add hello" -- hello.txt"#));
        assert!(!fake.called("git pull"));
        assert!(!fake.called("git push"));
    }

    #[tokio::test]
    async fn commit_with_remote_pulls_then_pushes() {
        let (_td, fake, b) = backend(true);
        fake.stdout("git diff --cached", "hello.txt\n");
        b.commit("add hello", &[PathBuf::from("hello.txt")])
            .await
            .unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                "git add --all -- hello.txt".to_string(),
                "git diff --cached --name-only -- hello.txt".to_string(),
                r#"git commit -m "add hello" -- hello.txt"#.to_string(),
                "git pull --rebase origin main".to_string(),
                "git push origin main".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn pull_and_push_failures_are_distinguishable() {
        let (_td, fake, b) = backend(true);
        fake.stdout("git diff --cached", "a\n").fail("git pull", "conflict");
        let err = b.commit("m", &[PathBuf::from("a")]).await.unwrap_err();
        assert_eq!(err.remote_phase(), Some(RemotePhase::Pull));
        assert!(!fake.called("git push"));

        let (_td, fake, b) = backend(true);
        fake.stdout("git diff --cached", "a\n").fail("git push", "rejected");
        let err = b.commit("m", &[PathBuf::from("a")]).await.unwrap_err();
        assert_eq!(err.remote_phase(), Some(RemotePhase::Push));
        assert_eq!(err.captured_output(), Some("rejected"));
    }

    #[tokio::test]
    async fn synchronize_without_marker_is_not_initialized() {
        let (_td, fake, b) = backend(true);
        let err = b.synchronize().await.unwrap_err();
        assert!(matches!(err, SyncError::NotInitialized(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn synchronize_pulls_with_rebase() {
        let (_td, fake, b) = backend(true);
        b.marker.write().unwrap();
        b.synchronize().await.unwrap();
        assert_eq!(fake.calls(), vec!["git pull --rebase origin main".to_string()]);
    }

    #[test]
    fn contributors_are_deduplicated() {
        let (_td, fake, b) = backend(false);
        fake.stdout("git log", "Ada <ada@x>\nBob <bob@x>\nAda <ada@x>\n");
        let got = b.all_contributors().unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.contains("Ada <ada@x>"));
        assert!(got.contains("Bob <bob@x>"));
    }

    #[test]
    fn identity_reads_git_config() {
        let (_td, fake, b) = backend(false);
        fake.stdout("git config user.name", "Ada Lovelace\n")
            .stdout("git config user.email", "ada@x.org\n");
        assert_eq!(b.current_user_identity().unwrap(), "Ada Lovelace <ada@x.org>");
    }

    #[test]
    fn commands_are_pinned_to_storage() {
        let (td, fake, b) = backend(false);
        let _ = b.all_contributors();
        assert!(fake.invocations().iter().all(|i| i.cwd == td.path()));
    }
}
