//! # dumpvault
//!
//! **dumpvault** keeps database backups as git history.
//!
//! Features:
//! - `dumpvault dump` writes a timestamped `mysqldump` of the WordPress database
//! - `dumpvault push` publishes an existing dump to the backup repository
//! - `dumpvault backup` does both in one run
//! - `dumpvault home` prints the configuration directory
//!
//! Settings come from `$(dumpvault home)/config.toml`; flags take precedence.
//! Logging is controlled with `RUST_LOG` (default `info`).
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dumpvault::{DumpArgs, RepoArgs, SyncError, cmd_backup, cmd_dump, cmd_push, dumpvault_home};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "dumpvault",
    version,
    about = "dumpvault - database dumps published as git history",
    arg_required_else_help = true
)]
struct Cli {
    /// Configuration file (defaults to $(dumpvault home)/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Dump the database into a timestamped .sql file
    Dump(DumpArgs),
    /// Commit an existing dump and push it to the backup repository
    Push {
        /// Dump file to publish
        #[arg(long)]
        artifact: PathBuf,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Dump the database and push the result
    Backup {
        #[command(flatten)]
        dump: DumpArgs,
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Print the dumpvault configuration directory
    Home,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.cmd {
        Cmd::Dump(args) => cmd_dump(config, &args),
        Cmd::Push { artifact, repo } => cmd_push(config, &repo, &artifact),
        Cmd::Backup { dump, repo } => cmd_backup(config, &dump, &repo),
        Cmd::Home => {
            println!("{}", dumpvault_home()?.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.chain().find_map(|c| c.downcast_ref::<SyncError>()) {
                Some(se) => eprintln!("{} [{}] {:#}", "error:".red().bold(), se.kind(), e),
                None => eprintln!("{} {:#}", "error:".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}
