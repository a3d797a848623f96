//! Configuration management for the Sitekick push agent
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `.env` file and environment variables
//! 4. Secret variables
//! 5. Command-line overrides
//!
//! # Usage
//!
//! ```no_run
//! use sitekick::config::{Config, Overrides};
//!
//! let config = Config::load(None, &Overrides::default()).expect("Failed to load configuration");
//! println!("Queue directory: {}", config.queue.path.display());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `SITEKICK__<section>__<key>`:
//! - `SITEKICK__PUSH__URL=https://collector.example/queues/plesk`
//! - `SITEKICK__PUSH__INTERVAL=2m`
//! - `SITEKICK__RUNNER__PROVIDERS=plesk,server`
//!
//! The bearer token and the GDPR key are read from `SITEKICK_TOKEN` and
//! `SITEKICK_GDPR_PSK`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/sitekick.toml`.
//! This can be overridden using the `SITEKICK_CONFIG` environment variable or
//! `--config-path`; a directory means `<dir>/sitekick.toml`.

mod models;
mod resolver;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    CollectConfig, Config, DEFAULT_BATCH_SIZE, DEFAULT_PUSH_INTERVAL_SECS, GdprConfig,
    LoggingConfig, Overrides, PushConfig, QueueConfig, RunnerConfig,
};
pub use resolver::ProviderSettings;
pub use validation::ValidationError;

use crate::backoff::Backoff;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources, then apply command-line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (bad URL, zero batch size, missing GDPR key, ...)
    pub fn load(path: Option<PathBuf>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = sources::load(path)?;
        overrides.apply(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, without secrets or overrides
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }

    pub fn collect_backoff(&self) -> Backoff {
        Backoff::new(
            self.collect.attempts,
            self.collect.first_retry.as_duration(),
            self.collect.last_retry.as_duration(),
        )
    }

    pub fn push_backoff(&self) -> Backoff {
        Backoff::new(
            self.push.attempts,
            self.push.first_retry.as_duration(),
            self.push.last_retry.as_duration(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[queue]\npath = \"/tmp/sitekick-queue\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.queue.path, PathBuf::from("/tmp/sitekick-queue"));
    }

    #[test]
    fn test_validation_catches_bad_url() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[push]\nurl = \"gopher://nowhere\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidPushUrl { .. })
        ));
    }

    #[test]
    fn test_overrides_are_validated() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        fs::write(&config_path, "").unwrap();

        let overrides = Overrides {
            batch_size: Some(0),
            ..Default::default()
        };

        let result = Config::load(Some(config_path), &overrides);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::NotPositive { .. })
        ));
    }

    #[test]
    fn test_backoff_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[push]
attempts = 3
first_retry = "10ms"
last_retry = "40ms"

[collect]
attempts = 2
first_retry = 0
last_retry = 0
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        let push: Vec<_> = config.push_backoff().delays().collect();
        assert_eq!(push.len(), 3);
        assert_eq!(push[0], Duration::from_millis(10));
        assert!(push[1].abs_diff(Duration::from_millis(20)) < Duration::from_micros(1));
        assert_eq!(push[2], Duration::from_millis(40));
        assert!(config.collect_backoff().delays().all(|d| d.is_zero()));
    }
}
