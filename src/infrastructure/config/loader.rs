use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration file.
pub const CONFIG_FILE: &str = ".reqforge/config.yaml";
/// Optional local overrides, not meant to be committed.
pub const LOCAL_CONFIG_FILE: &str = ".reqforge/local.yaml";
/// Prefix of environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "REQFORGE_";

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid max_iterations: {0}. Must be between 1 and 10")]
    InvalidMaxIterations(u32),

    #[error("Invalid acceptance_threshold: {0}. Must be between 1 and 5")]
    InvalidAcceptanceThreshold(u32),

    #[error("Invalid stage timeout key: {0}. Stages are numbered 1 to 6")]
    InvalidStageTimeoutKey(u8),

    #[error("Invalid timeout for stage {0}: must be greater than 0 seconds")]
    ZeroStageTimeout(u8),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: base_delay_ms ({0}) must be less than max_delay_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid jitter: {0}. Must be between 0.0 and 1.0")]
    InvalidJitter(f64),

    #[error("Invalid temperature: {0}. Must be between 0.0 and 2.0")]
    InvalidTemperature(f32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Oracle base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Oracle model cannot be empty")]
    EmptyModel,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .reqforge/config.yaml (project config)
    /// 3. .reqforge/local.yaml (project local overrides, optional)
    /// 4. Environment variables (REQFORGE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Yaml::file(LOCAL_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file instead of the project files.
    /// Environment variables still take precedence.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let pipeline = &config.pipeline;
        if !(1..=10).contains(&pipeline.max_iterations) {
            return Err(ConfigError::InvalidMaxIterations(pipeline.max_iterations));
        }
        if !(1..=5).contains(&pipeline.acceptance_threshold) {
            return Err(ConfigError::InvalidAcceptanceThreshold(
                pipeline.acceptance_threshold,
            ));
        }
        for (stage, secs) in pipeline.stage_timeouts.iter() {
            if !(1..=6).contains(&stage) {
                return Err(ConfigError::InvalidStageTimeoutKey(stage));
            }
            if secs == 0 {
                return Err(ConfigError::ZeroStageTimeout(stage));
            }
        }

        let retry = &config.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(retry.max_attempts));
        }
        if retry.base_delay_ms >= retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.base_delay_ms,
                retry.max_delay_ms,
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::InvalidJitter(retry.jitter));
        }

        let oracle = &config.oracle;
        if !(0.0..=2.0).contains(&oracle.temperature) {
            return Err(ConfigError::InvalidTemperature(oracle.temperature));
        }
        if oracle.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if oracle.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
