//! workgridd — the WorkGrid daemon.
//!
//! Assembles the scheduling engine in one process:
//! - Workload context managers (one per simulated member)
//! - In-process cluster transport
//! - Static inventory from the config file, cached
//! - One distributed scheduler loop per member, sharing a lock
//!
//! # Usage
//!
//! ```text
//! workgridd standalone --config workgrid.toml --members 3
//! ```

mod standalone;
mod ticker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "workgridd", about = "WorkGrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a whole cluster of simulated members in this process.
    Standalone {
        /// Path to workgrid.toml. Built-in defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of simulated cluster members.
        #[arg(long, default_value = "1")]
        members: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,workgridd=debug,workgrid=debug"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Standalone { config, members } => standalone::run(config, members).await,
    }
}
