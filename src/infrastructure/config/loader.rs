use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

use crate::domain::models::config::Config;
use crate::domain::models::SourceId;

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("multichat is disabled in configuration")]
    Disabled,

    #[error("No sources configured")]
    NoSources,

    #[error("No valid enabled source")]
    NoValidSources,

    #[error("Duplicate source prefix: {0}")]
    DuplicatePrefix(String),

    #[error("Duplicate source id: {0}")]
    DuplicateSourceId(SourceId),

    #[error("Invalid max_messages: {0}. Must be at least 1")]
    InvalidMaxMessages(usize),

    #[error("Invalid {field}: {value}. Must be positive")]
    InvalidInterval { field: &'static str, value: u64 },

    #[error("Invalid queue limits: soft limit {soft_limit}, shed batch {shed_batch}")]
    InvalidQueueLimits { soft_limit: usize, shed_batch: usize },

    #[error("Worker command cannot be empty")]
    EmptyWorkerCommand,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .multichat/config.yaml (project config)
    /// 3. .multichat/local.yaml (local overrides, optional)
    /// 4. Environment variables (MULTICHAT_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config = Self::figment()
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
            .merge(Env::prefixed("MULTICHAT_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load without validating, for diagnostics that report problems themselves.
    pub fn load_unvalidated(path: Option<&std::path::Path>) -> Result<Config> {
        let figment = match path {
            Some(path) => Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("MULTICHAT_").split("__")),
            None => Self::figment(),
        };
        figment
            .extract()
            .context("Failed to extract configuration from figment")
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".multichat/config.yaml"))
            .merge(Yaml::file(".multichat/local.yaml"))
            .merge(Env::prefixed("MULTICHAT_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Invalid source entries are skipped with a warning; the configuration
    /// is only rejected when no usable source remains.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if !config.enabled {
            return Err(ConfigError::Disabled);
        }

        if config.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        for (index, source) in config.sources.iter().enumerate() {
            if let Some(problem) = source.validation_error() {
                warn!(index, prefix = %source.prefix, problem, "Skipping invalid source entry");
            }
        }

        let active = config.active_sources();
        if active.is_empty() {
            return Err(ConfigError::NoValidSources);
        }

        let mut prefixes = HashSet::new();
        let mut ids = HashSet::new();
        for source in &active {
            if !prefixes.insert(source.prefix.as_str()) {
                return Err(ConfigError::DuplicatePrefix(source.prefix.clone()));
            }
            let id = source.id();
            if ids.contains(&id) {
                return Err(ConfigError::DuplicateSourceId(id));
            }
            ids.insert(id);
        }

        if config.feed.max_messages == 0 {
            return Err(ConfigError::InvalidMaxMessages(config.feed.max_messages));
        }

        let intervals = [
            ("feed.merge_interval_ms", config.feed.merge_interval_ms),
            ("intake.poll_interval_ms", config.intake.poll_interval_ms),
            (
                "intake.inactivity_timeout_secs",
                config.intake.inactivity_timeout_secs,
            ),
            (
                "supervisor.monitor_interval_secs",
                config.supervisor.monitor_interval_secs,
            ),
            ("status.interval_secs", config.status.interval_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidInterval { field, value });
            }
        }

        if config.intake.queue_soft_limit == 0 || config.intake.queue_shed_batch == 0 {
            return Err(ConfigError::InvalidQueueLimits {
                soft_limit: config.intake.queue_soft_limit,
                shed_batch: config.intake.queue_shed_batch,
            });
        }

        if config.persistence.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "persistence.max_attempts must be at least 1".to_string(),
            ));
        }

        if config.performance.enabled && config.performance.max_per_source_per_cycle == 0 {
            return Err(ConfigError::ValidationFailed(
                "performance.max_per_source_per_cycle must be at least 1".to_string(),
            ));
        }

        if config.supervisor.worker_command.trim().is_empty() {
            return Err(ConfigError::EmptyWorkerCommand);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
