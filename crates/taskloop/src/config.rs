//! Scheduler configuration (taskloop.toml)
//!
//! ```toml
//! thread_name = "taskloop"
//! default_timeout_ms = 30000
//! join_timeout_ms = 2000
//! log_queue_warnings = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to render TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Event loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Name of the thread spawned by `start_in_background`
    pub thread_name: String,

    /// Timeout applied when a submission does not choose one (None = wait forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// How long shutdown waits for the loop thread before detaching it
    pub join_timeout_ms: u64,

    /// Warn when the loop stops with submissions still queued
    pub log_queue_warnings: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "taskloop".to_string(),
            default_timeout_ms: None,
            join_timeout_ms: 2000,
            log_queue_warnings: true,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "thread_name cannot be empty".to_string(),
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(ConfigError::ValidationError(
                "thread_name cannot contain NUL bytes".to_string(),
            ));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "join_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
