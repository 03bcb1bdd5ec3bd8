#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for hmc
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/hmc/config.toml)
//! - Environment variables
//! - CLI flags

pub mod core;

pub use crate::core::{AgentConfig, DispatchConfig, PathConfig, StateConfig, WorkerConfig};

use hmc_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub state: StateConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("hmc").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        self.merge_from(|key| std::env::var(key).ok())
    }

    /// Apply `HMC_*` overrides from an arbitrary lookup.
    fn merge_from<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        // HMC_DB_PATH
        if let Some(path) = lookup("HMC_DB_PATH") {
            self.paths.db_path = Some(PathBuf::from(path));
        }

        // HMC_LOG_DIR
        if let Some(path) = lookup("HMC_LOG_DIR") {
            self.paths.log_dir = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("HMC_DISPATCH_TIMEOUT") {
            self.dispatch.timeout_secs = parse_env("HMC_DISPATCH_TIMEOUT", value)?;
        }

        if let Some(value) = lookup("HMC_MAX_RETRIES") {
            self.dispatch.max_retries = parse_env("HMC_MAX_RETRIES", value)?;
        }

        if let Some(value) = lookup("HMC_MAX_CONCURRENT_HOSTS") {
            self.workers.max_concurrent_hosts = parse_env("HMC_MAX_CONCURRENT_HOSTS", value)?;
        }

        // HMC_AGENT_PROGRAM
        if let Some(program) = lookup("HMC_AGENT_PROGRAM") {
            if program.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "HMC_AGENT_PROGRAM".to_string(),
                    value: program,
                }
                .into());
            }
            self.agent.program = program;
        }

        if let Some(value) = lookup("HMC_RETENTION_DAYS") {
            self.state.retention_days = parse_env("HMC_RETENTION_DAYS", value)?;
        }

        self.validate()
    }

    /// Reject values that would make the dispatcher misbehave.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first bad field.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: &str| -> Error {
            ConfigError::Invalid {
                message: message.to_string(),
            }
            .into()
        };

        if self.dispatch.timeout_secs == 0 {
            return Err(invalid("dispatch.timeout_secs must be greater than zero"));
        }
        if self.dispatch.backoff_multiplier < 1.0 {
            return Err(invalid("dispatch.backoff_multiplier must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.dispatch.jitter_factor) {
            return Err(invalid("dispatch.jitter_factor must be between 0.0 and 1.0"));
        }
        if self.dispatch.initial_backoff_ms > self.dispatch.max_backoff_ms {
            return Err(invalid(
                "dispatch.initial_backoff_ms must not exceed dispatch.max_backoff_ms",
            ));
        }
        if self.agent.success_exit_codes.is_empty() {
            return Err(invalid("agent.success_exit_codes must not be empty"));
        }
        Ok(())
    }

    /// Get the database path (with default)
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hmc")
                .join("state.sqlite")
        })
    }

    /// Get the log directory, if file logging is configured
    #[must_use]
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.paths.log_dir.clone()
    }

    /// Effective worker pool size
    #[must_use]
    pub fn worker_count(&self) -> usize {
        calculate_worker_count(self.workers.max_concurrent_hosts)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}

/// Calculate worker pool size based on CPU count
#[must_use]
pub fn calculate_worker_count(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Host dispatches mostly wait on remote agents, so oversubscribe
        (num_cpus::get() * 4).max(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .merge_from(lookup(&[
                ("HMC_DB_PATH", "/tmp/hmc.sqlite"),
                ("HMC_MAX_RETRIES", "5"),
                ("HMC_MAX_CONCURRENT_HOSTS", "16"),
            ]))
            .unwrap();

        assert_eq!(config.db_path(), PathBuf::from("/tmp/hmc.sqlite"));
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.worker_count(), 16);
    }

    #[test]
    fn bad_env_value_is_reported_with_field() {
        let mut config = Config::default();
        let err = config
            .merge_from(lookup(&[("HMC_DISPATCH_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { ref field, .. }) if field == "HMC_DISPATCH_TIMEOUT"
        ));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut config = Config::default();
        let err = config
            .merge_from(lookup(&[("HMC_DISPATCH_TIMEOUT", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn auto_worker_count_is_positive() {
        assert!(calculate_worker_count(0) >= 4);
        assert_eq!(calculate_worker_count(3), 3);
    }
}
