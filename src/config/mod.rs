//! Configuration Module
//!
//! Provides TOML-based configuration for the relay with support for:
//! - Local broker connection and default topic
//! - Cloud connection string and TLS settings
//! - Optional self-test traffic
//! - Environment variable overrides (RELAY__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub use broker::BrokerConfig;
pub use cloud::CloudConfig;

mod broker;
mod cloud;

use crate::cloud::ConnectionString;
use crate::topic::validate_topic_name;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}


/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Local broker connection
    pub broker: BrokerConfig,
    /// Cloud ingestion connection
    pub cloud: CloudConfig,
    /// Synthetic traffic published through the broker at startup
    pub self_test: SelfTestConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Self-test traffic generator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelfTestConfig {
    pub enabled: bool,
    /// Number of messages to publish
    pub count: u32,
    /// Delay between two messages
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 50,
            interval: Duration::from_millis(200),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `RELAY__` prefix with double underscores for nesting:
    ///    - `RELAY__BROKER__PORT=1884` overrides `broker.port`
    ///    - `RELAY__CLOUD__CONNECTION_STRING=...` overrides `cloud.connection_string`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("broker.address", "localhost")?
            .set_default("broker.port", 1883)?
            .set_default("broker.keep_alive", 60)?
            .set_default("broker.connect_timeout", "10s")?
            .set_default("broker.operation_timeout", "10s")?
            .set_default("broker.qos", 0)?
            .set_default("broker.payload_format", "text")?
            .set_default("cloud.port", 8883)?
            .set_default("cloud.sas_ttl", "1h")?
            .set_default("cloud.keep_alive", 60)?
            .set_default("cloud.connect_timeout", "10s")?
            .set_default("cloud.operation_timeout", "10s")?
            .set_default("self_test.enabled", false)?
            .set_default("self_test.count", 50)?
            .set_default("self_test.interval", "200ms")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        if self.broker.default_topic.is_empty() {
            return invalid("broker.default_topic is required".to_string());
        }
        if let Err(reason) = validate_topic_name(&self.broker.default_topic) {
            return invalid(format!(
                "broker.default_topic '{}' is invalid: {}",
                self.broker.default_topic, reason
            ));
        }
        if self.broker.address.is_empty() {
            return invalid("broker.address cannot be empty".to_string());
        }
        if self.broker.port == 0 {
            return invalid("broker.port cannot be 0".to_string());
        }
        if self.broker.qos > 1 {
            return invalid("broker.qos must be 0 or 1".to_string());
        }
        if self.broker.connect_timeout.is_zero() || self.broker.operation_timeout.is_zero() {
            return invalid("broker timeouts must be greater than zero".to_string());
        }
        if self.broker.password.is_some() && self.broker.username.is_none() {
            return invalid("broker.password requires broker.username".to_string());
        }

        if self.cloud.connection_string.is_empty() {
            return invalid("cloud.connection_string is required".to_string());
        }
        if let Err(e) = self.cloud.connection_string.parse::<ConnectionString>() {
            return invalid(format!("cloud.connection_string: {}", e));
        }
        if self.cloud.port == 0 {
            return invalid("cloud.port cannot be 0".to_string());
        }
        if self.cloud.sas_ttl.as_secs() == 0 {
            return invalid("cloud.sas_ttl must be at least one second".to_string());
        }
        if self.cloud.connect_timeout.is_zero() || self.cloud.operation_timeout.is_zero() {
            return invalid("cloud timeouts must be greater than zero".to_string());
        }

        if self.self_test.enabled && self.self_test.count == 0 {
            return invalid("self_test.count must be greater than zero when enabled".to_string());
        }

        Ok(())
    }
}
