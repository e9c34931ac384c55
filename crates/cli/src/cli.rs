//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Beacon - durable multi-consumer event dispatch
#[derive(Parser, Debug)]
#[command(
    name = "beacon",
    author,
    version,
    about = "Durable multi-consumer event dispatch",
    long_about = "Tracks events into a durable SQLite queue and drains them to the configured \n\
                  dispatchers once each consumer's barriers open."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BEACON_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "BEACON_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track events from JSON lines and drain them to the dispatchers
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and queue information
    Info(InfoArgs),

    /// Remove queued Dispatches
    Purge(PurgeArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "beacon.toml", env = "BEACON_CONFIG")]
    pub config: PathBuf,

    /// JSON-lines event file (default: stdin)
    #[arg(short, long, env = "BEACON_INPUT")]
    pub input: Option<PathBuf>,

    /// Override the store path from configuration
    #[arg(long, env = "BEACON_STORE")]
    pub store: Option<PathBuf>,

    /// Overall timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "BEACON_TIMEOUT")]
    pub timeout: u64,

    /// Seconds to keep draining after the input ends
    #[arg(long, default_value = "10", env = "BEACON_DRAIN_TIMEOUT")]
    pub drain_timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BEACON_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "beacon.toml", env = "BEACON_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "beacon.toml", env = "BEACON_CONFIG")]
    pub config: PathBuf,

    /// Override the store path from configuration
    #[arg(long, env = "BEACON_STORE")]
    pub store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show pending counts read from the store
    #[arg(long)]
    pub pending: bool,

    /// Show barrier configuration
    #[arg(long)]
    pub barriers: bool,
}

/// Arguments for the `purge` command
#[derive(Parser, Debug)]
pub struct PurgeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "beacon.toml", env = "BEACON_CONFIG")]
    pub config: PathBuf,

    /// Override the store path from configuration
    #[arg(long, env = "BEACON_STORE")]
    pub store: Option<PathBuf>,

    /// Drop every queue entry of this consumer
    #[arg(long, required_unless_present_any = ["expired", "older_than"])]
    pub consumer: Option<String>,

    /// Delete Dispatches past the configured expiration
    #[arg(long)]
    pub expired: bool,

    /// Delete Dispatches older than this many seconds
    #[arg(long, conflicts_with = "expired")]
    pub older_than: Option<u64>,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
