//! Configuration management
//!
//! Layered configuration loaded from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Settings can be overridden with the pattern `DRIVEFETCH__<section>__<key>`:
//! - `DRIVEFETCH__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `DRIVEFETCH__STORAGE__MODELS_ROOT=/srv/models`
//! - `DRIVEFETCH__FETCH__BUDGET_SECS=120`
//!
//! # Configuration File
//!
//! By default the configuration is read from `config/drivefetch.toml`; the
//! `DRIVEFETCH_CONFIG` environment variable points it elsewhere.

mod models;
mod sources;

pub use crate::humanize::ByteSize;
pub use models::{Config, FetchConfig, ProgressConfig, ServerConfig, StorageConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("fetch.budget_secs must be greater than zero")]
    ZeroBudget,

    #[error("fetch.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("fetch.poll_interval_ms must not exceed the fetch budget")]
    PollExceedsBudget,
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.fetch.budget_secs == 0 {
        return Err(ValidationError::ZeroBudget);
    }
    if config.fetch.poll_interval_ms == 0 {
        return Err(ValidationError::ZeroPollInterval);
    }
    if config.fetch.poll_interval_ms > config.fetch.budget_secs * 1000 {
        return Err(ValidationError::PollExceedsBudget);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[server]\nbind_addr = \"127.0.0.1:8000\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:8000");
    }

    #[test]
    fn validation_rejects_zero_budget() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[fetch]\nbudget_secs = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::ZeroBudget)
        ));
    }

    #[test]
    fn validation_rejects_poll_interval_above_budget() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            "[fetch]\nbudget_secs = 1\npoll_interval_ms = 5000\n",
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::PollExceedsBudget)
        ));
    }
}
