use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_rounds: {0}. Must be at least 1")]
    InvalidMaxRounds(u64),

    #[error("Invalid per_session_cost_limit: {0}. Must be positive")]
    InvalidSessionCostLimit(f64),

    #[error("Invalid daily_cost_threshold: {0}. Must be positive")]
    InvalidDailyCostThreshold(f64),

    #[error("Invalid agent_timeout_secs: {0}. Must be at least 1")]
    InvalidAgentTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid termination.stall_window: {0}. Must be at least 2")]
    InvalidStallWindow(usize),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .datawise/config.yaml (project config)
    /// 3. .datawise/local.yaml (project local overrides, optional)
    /// 4. Environment variables (DATAWISE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".datawise/config.yaml"))
            .merge(Yaml::file(".datawise/local.yaml"))
            .merge(Env::prefixed("DATAWISE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_rounds == 0 {
            return Err(ConfigError::InvalidMaxRounds(config.max_rounds));
        }

        if config.per_session_cost_limit <= 0.0 {
            return Err(ConfigError::InvalidSessionCostLimit(
                config.per_session_cost_limit,
            ));
        }

        if config.daily_cost_threshold <= 0.0 {
            return Err(ConfigError::InvalidDailyCostThreshold(
                config.daily_cost_threshold,
            ));
        }

        if config.agent_timeout_secs == 0 {
            return Err(ConfigError::InvalidAgentTimeout(config.agent_timeout_secs));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.termination.stall_window < 2 {
            return Err(ConfigError::InvalidStallWindow(
                config.termination.stall_window,
            ));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
