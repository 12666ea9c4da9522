//! External process invocation.
//!
//! Every command carries its own working directory. Nothing in this crate
//! changes the process-global current directory, so two runners pointed at
//! different repositories never interfere with each other.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::{Result, SyncError};

/// A fully described external command: program, arguments and the directory
/// it must run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned()),
        );
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            if a.is_empty() || a.contains(char::is_whitespace) {
                write!(f, " {:?}", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        Ok(())
    }
}

/// Exit status and captured text of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, verbatim.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }

    /// Turn a non-zero exit into [`SyncError::CommandFailed`].
    pub fn check(self, inv: &Invocation) -> Result<CmdOutput> {
        if self.success() {
            return Ok(self);
        }
        Err(SyncError::CommandFailed {
            command: inv.to_string(),
            status: self
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            output: self.combined(),
        })
    }
}

impl From<Output> for CmdOutput {
    fn from(o: Output) -> Self {
        Self {
            code: o.status.code(),
            stdout: String::from_utf8_lossy(&o.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&o.stderr).into_owned(),
        }
    }
}

/// Seam between the backends and the operating system.
///
/// Implementations report any exit status as `Ok`; only a failure to run the
/// command at all is an `Err`. Use [`CmdOutput::check`] to reject non-zero
/// exits.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, inv: &Invocation) -> Result<CmdOutput>;

    fn run_blocking(&self, inv: &Invocation) -> Result<CmdOutput>;
}

/// Runs commands as real child processes.
///
/// Children are spawned with `kill_on_drop`, so dropping the future of an
/// in-flight command (cancellation, deadline) also terminates the process.
/// The deadline set with [`ProcessRunner::with_timeout`] bounds blocking
/// queries too.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn_error(inv: &Invocation, source: std::io::Error) -> SyncError {
        SyncError::Spawn {
            command: inv.to_string(),
            cwd: inv.cwd.clone(),
            source,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, inv: &Invocation) -> Result<CmdOutput> {
        debug!(cwd = %inv.cwd.display(), command = %inv, "running");
        let mut cmd = tokio::process::Command::new(&inv.program);
        cmd.args(&inv.args)
            .current_dir(&inv.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| SyncError::TimedOut {
                    command: inv.to_string(),
                    timeout: limit,
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| Self::spawn_error(inv, e))?;

        let out = CmdOutput::from(output);
        trace!(code = ?out.code, output = %out.combined(), "finished");
        Ok(out)
    }

    fn run_blocking(&self, inv: &Invocation) -> Result<CmdOutput> {
        debug!(cwd = %inv.cwd.display(), command = %inv, "running (blocking)");
        let mut cmd = std::process::Command::new(&inv.program);
        cmd.args(&inv.args)
            .current_dir(&inv.cwd)
            .stdin(Stdio::null());
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        let output = match self.timeout {
            Some(limit) => Self::output_within(inv, &mut cmd, limit)?,
            None => cmd.output().map_err(|e| Self::spawn_error(inv, e))?,
        };
        Ok(CmdOutput::from(output))
    }
}

impl ProcessRunner {
    /// Blocking counterpart of the `tokio::time::timeout` in
    /// [`CommandRunner::run`]: poll the child and kill it once `limit` passes.
    fn output_within(
        inv: &Invocation,
        cmd: &mut std::process::Command,
        limit: Duration,
    ) -> Result<Output> {
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_error(inv, e))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let collect = |h: Option<thread::JoinHandle<Vec<u8>>>| {
            h.and_then(|h| h.join().ok()).unwrap_or_default()
        };

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Output {
                    status,
                    stdout: collect(stdout),
                    stderr: collect(stderr),
                });
            }
            if start.elapsed() > limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SyncError::TimedOut {
                    command: inv.to_string(),
                    timeout: limit,
                });
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

/// One external tool bound to one repository directory.
#[derive(Clone)]
pub struct Tool {
    program: &'static str,
    cwd: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Tool {
    pub fn new(program: &'static str, cwd: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program,
            cwd: cwd.to_path_buf(),
            runner,
        }
    }

    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Invocation::new(self.program, &self.cwd).args(args)
    }

    /// Run and require a zero exit.
    pub async fn run<I, S>(&self, args: I) -> Result<CmdOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let inv = self.invocation(args);
        self.runner.run(&inv).await?.check(&inv)
    }

    pub fn run_blocking<I, S>(&self, args: I) -> Result<CmdOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let inv = self.invocation(args);
        self.runner.run_blocking(&inv)?.check(&inv)
    }
}
