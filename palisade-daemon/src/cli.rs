//! CLI argument definitions for palisade-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Palisade SIEM daemon.
///
/// Runs the full ingestion pipeline: UDP syslog collection, parsing,
/// batched indexing, and rule-based alerting.
#[derive(Parser, Debug)]
#[command(name = "palisade-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to palisade.toml configuration file.
    #[arg(short, long, default_value = "/etc/palisade/palisade.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and rule files, then exit without starting.
    #[arg(long)]
    pub validate: bool,
}
