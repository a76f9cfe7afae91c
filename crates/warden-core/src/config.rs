//! Runtime configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Health monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between periodic health checks; seeds each new system's
    /// monitoring cadence.
    pub check_interval_secs: u64,
    /// Health score below which a system escalates to maintenance.
    pub escalation_threshold: u8,
    /// Number of recent work items considered when scoring a system.
    pub lookback: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { check_interval_secs: 60, escalation_threshold: 50, lookback: 50 }
    }
}

/// Task retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay in seconds; retry n waits `base * 2^(n-1)`.
    pub base_delay_secs: u64,
    /// Retry ceiling used when a task does not set its own.
    pub default_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { base_delay_secs: 30, default_max_retries: 3 }
    }
}

/// Dispatcher loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Milliseconds between dispatcher ticks.
    pub poll_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 500 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Health monitoring settings.
    pub health: HealthConfig,
    /// Task retry settings.
    pub retry: RetryConfig,
    /// Dispatcher loop settings.
    pub dispatcher: DispatcherConfig,
}

impl WardenConfig {
    /// Parses a configuration from a TOML document and validates it.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if any field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.check_interval_secs == 0 {
            return Err(ConfigError::Invalid("health.check_interval_secs must be positive".into()));
        }
        if self.health.escalation_threshold > 100 {
            return Err(ConfigError::Invalid("health.escalation_threshold must be 0-100".into()));
        }
        if self.health.lookback == 0 {
            return Err(ConfigError::Invalid("health.lookback must be positive".into()));
        }
        if self.retry.base_delay_secs == 0 {
            return Err(ConfigError::Invalid("retry.base_delay_secs must be positive".into()));
        }
        if self.dispatcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("dispatcher.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = WardenConfig::from_toml_str("").unwrap();
        assert_eq!(config, WardenConfig::default());
        assert_eq!(config.health.check_interval_secs, 60);
        assert_eq!(config.health.escalation_threshold, 50);
        assert_eq!(config.retry.base_delay_secs, 30);
        assert_eq!(config.dispatcher.poll_interval_ms, 500);
    }

    #[test]
    fn test_partial_document_overrides_one_section() {
        let config = WardenConfig::from_toml_str(
            r#"
            [retry]
            base_delay_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.base_delay_secs, 5);
        assert_eq!(config.retry.default_max_retries, 3);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = WardenConfig::from_toml_str(
            r#"
            [health]
            check_interval_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_threshold_above_100_rejected() {
        let err = WardenConfig::from_toml_str(
            r#"
            [health]
            escalation_threshold = 101
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = WardenConfig::from_toml_str("[health").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
