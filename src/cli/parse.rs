//! CLI parse: clap types for contree. Definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Contree CLI - continuation tree registry and task scheduler
#[derive(Parser)]
#[command(name = "contree")]
#[command(about = "Inspect configuration and exercise the continuation registry")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (workspace config is read from <root>/config)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective, validated configuration
    Config {
        #[arg(long, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },
    /// Build synthetic flow trees, let them age, sweep and print what is left
    Simulate {
        /// Number of independent flows (trees)
        #[arg(long, default_value_t = 4)]
        flows: usize,
        /// Continuations per flow, each the child of the previous one
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Time-to-live of every continuation; 0 selects the configured default
        #[arg(long, default_value_t = 500)]
        ttl_ms: u64,
        /// Spread flows over this many sessions (0 keeps a single global holder)
        #[arg(long, default_value_t = 0)]
        sessions: usize,
        /// How long to let the flows age before the final sweep
        #[arg(long, default_value_t = 0)]
        wait_ms: u64,
        /// Override the background sweep period
        #[arg(long)]
        sweep_period_ms: Option<u64>,
        /// Expire every other flow explicitly through invalidation
        #[arg(long)]
        invalidate_odd: bool,
        #[arg(long, value_enum, default_value = "table")]
        format: ListingFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListingFormat {
    Table,
    Json,
}
