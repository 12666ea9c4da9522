//! # recsync
//!
//! Keeps a directory of records under version control.
//!
//! - `recsync init` creates the repository (safe to run repeatedly)
//! - `recsync commit <files>... -m <msg>` records changed files, then pushes
//!   when remote sync is enabled
//! - `recsync sync` pulls remote changes
//! - `recsync whoami` / `recsync contributors` print author identities
//! - `recsync config` shows (or `--edit`s) the configuration
//! - `recsync home` prints the recsync home directory
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recsync::config::{cmd_config_edit, cmd_config_show};
use recsync::{
    Executor, Paths, Vcs, cmd_commit, cmd_contributors, cmd_init, cmd_sync, cmd_whoami,
    load_config, paths, recsync_home,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "recsync",
    version,
    about = "recsync - version-controlled record storage",
    arg_required_else_help = true
)]
struct Cli {
    /// Path to config.toml (defaults to $(recsync home)/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create the storage repository if it does not exist yet
    Init,
    /// Commit record files (and push when remote sync is enabled)
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
        /// Record files, relative to the storage directory
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Pull and rebase onto the remote
    Sync,
    /// Print the configured user as `Name <email>`
    Whoami,
    /// List every author in the storage history
    Contributors,
    /// Show the resolved configuration
    Config {
        /// Open config.toml in $EDITOR instead
        #[arg(long)]
        edit: bool,
    },
    /// Print the recsync home directory
    Home,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "warn,recsync=info",
        2 => "info,recsync=debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut p: Paths = paths()?;
    if let Some(path) = cli.config {
        p.config = path;
    }

    match cli.cmd {
        Cmd::Home => {
            println!("{}", recsync_home()?.display());
            return Ok(ExitCode::SUCCESS);
        }
        Cmd::Config { edit: true } => {
            cmd_config_edit(&p.config)?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    // an unusable backend setting is fatal before any operation starts
    let backend = load_config(&p.config)?
        .resolve(&p)
        .with_context(|| format!("invalid configuration in {}", p.config.display()))?;
    let vcs = Vcs::open(&backend);
    let ex = Executor::new(vcs.clone());

    match cli.cmd {
        Cmd::Init => cmd_init(&ex).await,
        Cmd::Commit { message, files } => cmd_commit(&ex, message, files).await,
        Cmd::Sync => cmd_sync(&ex).await,
        Cmd::Whoami => cmd_whoami(&vcs).map(|_| ExitCode::SUCCESS),
        Cmd::Contributors => cmd_contributors(&vcs).map(|_| ExitCode::SUCCESS),
        Cmd::Config { .. } => cmd_config_show(&backend, &p.config).map(|_| ExitCode::SUCCESS),
        Cmd::Home => Ok(ExitCode::SUCCESS),
    }
}
