//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for chartfeed.

use clap::{Parser, Subcommand};

use crate::model::{Range, normalize_symbol};

#[derive(Parser, Debug, Clone)]
#[command(name = "chartfeed")]
#[command(about = "Chartfeed stock chart data pipeline")]
#[command(long_about = "Fetches, caches and aggregates stock chart data for display")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Fetch charts for symbols and print a summary
    Refresh {
        /// Symbols to refresh; defaults to the configured symbols
        symbols: Vec<String>,

        /// Chart range (one-day, one-year)
        #[arg(long, value_parser = parse_range)]
        range: Option<Range>,

        /// Serve generated data instead of calling the provider
        #[arg(long)]
        mock: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}

fn parse_range(value: &str) -> Result<Range, String> {
    value.parse::<Range>().map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }
}

/// Uppercase and trim command line symbols, dropping empty ones
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    symbols
        .iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| !s.is_empty())
        .collect()
}
