//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Degradation proxy - utilization-shaped latency and failure injection
#[derive(Parser, Debug)]
#[command(name = "degradation-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DEGRADATION_PROXY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "DEGRADATION_PROXY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DEGRADATION_PROXY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive synthetic calls through a degradation handler
    Simulate {
        /// Number of calls to dispatch
        #[arg(short = 'n', long, default_value_t = 100)]
        calls: usize,

        /// Maximum calls in flight at once
        #[arg(short = 'j', long, default_value_t = 10)]
        concurrency: usize,

        /// Operation name passed to the method filter
        #[arg(long, default_value = "simulate")]
        operation: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Sample degradation plans at a fixed utilization
    Plan {
        /// Pool utilization in [0, 1]
        #[arg(short, long, default_value_t = 0.5)]
        utilization: f64,

        /// Number of plans to sample
        #[arg(short, long, default_value_t = 1000)]
        samples: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}
