//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.eventbatcher.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".eventbatcher.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dispatcher settings.
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default input path (`-` for stdin).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Write a metrics export here after shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_out: Option<String>,
}

/// Batching dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Sink endpoint receiving batches via POST.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum events per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Background flush period in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Delivery attempts per batch.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff unit in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,

    /// Notification channel buffer size.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_seconds: default_timeout(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8080/events".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_notification_capacity() -> usize {
    256
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.eventbatcher.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref endpoint) = args.endpoint {
            self.dispatcher.endpoint = endpoint.clone();
        }
        if let Some(batch_size) = args.batch_size {
            self.dispatcher.batch_size = batch_size;
        }
        if let Some(interval) = args.flush_interval_ms {
            self.dispatcher.flush_interval_ms = interval;
        }
        if let Some(attempts) = args.retry_attempts {
            self.dispatcher.retry_attempts = attempts;
        }
        if let Some(base) = args.backoff_base_ms {
            self.dispatcher.backoff_base_ms = base;
        }
        if let Some(timeout) = args.timeout {
            self.dispatcher.request_timeout_seconds = timeout;
        }

        if let Some(ref input) = args.input {
            self.general.input = Some(input.display().to_string());
        }
        if let Some(ref metrics_out) = args.metrics_out {
            self.general.metrics_out = Some(metrics_out.display().to_string());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dispatcher.batch_size, 10);
        assert_eq!(config.dispatcher.retry_attempts, 3);
        assert_eq!(config.dispatcher.flush_interval_ms, 5000);
        assert!(config.general.metrics_out.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true
metrics_out = "metrics.json"

[dispatcher]
endpoint = "https://collector.example.com/v1/batch"
batch_size = 50
retry_attempts = 5
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.general.metrics_out.as_deref(), Some("metrics.json"));
        assert_eq!(
            config.dispatcher.endpoint,
            "https://collector.example.com/v1/batch"
        );
        assert_eq!(config.dispatcher.batch_size, 50);
        assert_eq!(config.dispatcher.retry_attempts, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.dispatcher.backoff_base_ms, 1000);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[dispatcher]"));
        assert!(toml_str.contains("batch_size = 10"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.dispatcher.endpoint, default_endpoint());
    }

    #[test]
    fn test_merge_only_explicit_args() {
        let mut config = Config::default();
        config.dispatcher.batch_size = 25;
        config.dispatcher.retry_attempts = 7;

        let args = Args::parse_from([
            "eventbatcher",
            "--endpoint",
            "http://127.0.0.1:9000/ingest",
            "--retry-attempts",
            "2",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.dispatcher.endpoint, "http://127.0.0.1:9000/ingest");
        assert_eq!(config.dispatcher.retry_attempts, 2);
        assert_eq!(config.dispatcher.batch_size, 25);
    }

    #[test]
    fn test_load_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load_from_dir(temp_dir.path()).unwrap().is_none());

        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            "[dispatcher]\nbatch_size = 3\n",
        )
        .unwrap();
        let config = Config::load_from_dir(temp_dir.path()).unwrap().unwrap();
        assert_eq!(config.dispatcher.batch_size, 3);

        std::fs::write(temp_dir.path().join(CONFIG_FILE), "[dispatcher\n").unwrap();
        assert!(Config::load_from_dir(temp_dir.path()).is_err());
    }
}
