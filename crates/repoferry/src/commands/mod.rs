//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, it falls back to defaults
/// and logs why.
pub fn load_config() -> repoferry_core::config::Config {
    repoferry_core::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using default configuration");
        repoferry_core::config::Config::default()
    })
}

pub mod config;
pub mod status;

/// Repoferry - Progress of resumable repository transfers
#[derive(Parser)]
#[command(name = "repoferry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Show the status of the transfer run
    Status(StatusArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the status command
#[derive(Parser)]
pub struct StatusArgs {
    /// Run directory to report on (defaults to the configured one)
    #[arg(long, env = "REPOFERRY_RUN_DIR")]
    pub run_dir: Option<PathBuf>,

    /// Refresh the status at this interval until Ctrl-C (e.g., 5s, 1m)
    #[arg(short, long, value_name = "INTERVAL")]
    pub watch: Option<String>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,
}
