//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// EventBatcher - batching event dispatcher
///
/// Reads JSON-lines events and delivers them to an HTTP collector in
/// bounded batches, retrying failed sends with exponential backoff.
///
/// Examples:
///   eventbatcher --endpoint https://collector.example.com/batch --input events.jsonl
///   cat events.jsonl | eventbatcher --endpoint http://localhost:8080/events --batch-size 50
///   eventbatcher --input events.jsonl --dry-run
///   eventbatcher --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Collector endpoint receiving batches via POST
    ///
    /// Can also be set via EVENTBATCHER_ENDPOINT or .eventbatcher.toml.
    #[arg(short, long, value_name = "URL", env = "EVENTBATCHER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// JSON-lines input file, or '-' for stdin (default)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Maximum events per batch
    #[arg(long, value_name = "COUNT")]
    pub batch_size: Option<usize>,

    /// Background flush interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub flush_interval_ms: Option<u64>,

    /// Delivery attempts per batch (including the first)
    #[arg(long, value_name = "COUNT")]
    pub retry_attempts: Option<u32>,

    /// Backoff unit in milliseconds; attempt k waits 2^k units
    #[arg(long, value_name = "MS")]
    pub backoff_base_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write a JSON metrics export here after shutdown
    #[arg(long, value_name = "FILE")]
    pub metrics_out: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .eventbatcher.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Fail on the first malformed input line instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Dry run: parse and validate input without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .eventbatcher.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }

        if self.flush_interval_ms == Some(0) {
            return Err("Flush interval must be at least 1 ms".to_string());
        }

        if self.retry_attempts == Some(0) {
            return Err("Retry attempts must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref input) = self.input {
            if input.as_os_str() != "-" && !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings. `verbose_default`
    /// is the config file's `verbose`; `--quiet` wins over both.
    pub fn log_level(&self, verbose_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
