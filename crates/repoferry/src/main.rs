//! Repoferry CLI - Progress of resumable repository transfers
//!
//! Repoferry reports on a repository transfer run from its run directory,
//! whether or not the transfer is still going.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the status of the current run
//! repoferry status
//!
//! # Refresh the status every 5 seconds until Ctrl-C
//! repoferry status --watch 5s
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Status(args) => commands::status::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,repoferry=info,repoferry_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
