//! Client configuration.
//!
//! Loaded either from any serde source (e.g. a TOML or JSON file owned by the
//! embedding application) or from `I2_*` environment variables via
//! [`ClientConfig::from_env`].

use protocol::{AccessKey, Address, ValidationMode};
use serde::Deserialize;
use thiserror::Error;

use crate::observability::LogFormat;

pub const ENV_URL: &str = "I2_URL";
pub const ENV_ACCESS_KEY: &str = "I2_ACCESS_KEY";
pub const ENV_VERBOSE: &str = "I2_VERBOSE";
pub const ENV_STRICT_VALIDATION: &str = "I2_STRICT_VALIDATION";
pub const ENV_LOG_FORMAT: &str = "I2_LOG_FORMAT";

/// Invalid or incomplete configuration. The client never starts with one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Configuration error: {variable} is not set")]
    Missing { variable: &'static str },

    #[error("Configuration error: {variable} has invalid value '{value}'")]
    Invalid {
        variable: &'static str,
        value: String,
    },
}

/// Everything needed to reach one worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Worker endpoint, e.g. `ws://127.0.0.1:8000`.
    pub url: Address,

    /// Credential presented during the handshake.
    pub access_key: AccessKey,

    /// Lowers the default log level from info to debug.
    #[serde(default)]
    pub verbose: bool,

    /// Whether unknown top-level keys in inbound frames are rejected.
    #[serde(default)]
    pub validation: ValidationMode,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl ClientConfig {
    pub fn new(url: Address, access_key: AccessKey) -> Self {
        Self {
            url,
            access_key,
            verbose: false,
            validation: ValidationMode::default(),
            log_format: LogFormat::default(),
        }
    }

    /// Reads the `I2_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |variable: &'static str| {
            lookup(variable)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing { variable })
        };

        let url = Address::new(required(ENV_URL)?).ok_or(ConfigError::Missing { variable: ENV_URL })?;
        let access_key = AccessKey::new(required(ENV_ACCESS_KEY)?)
            .ok_or(ConfigError::Missing { variable: ENV_ACCESS_KEY })?;

        let mut config = Self::new(url, access_key);
        if let Some(value) = lookup(ENV_VERBOSE) {
            config.verbose = parse_flag(ENV_VERBOSE, value)?;
        }
        if let Some(value) = lookup(ENV_STRICT_VALIDATION) {
            if parse_flag(ENV_STRICT_VALIDATION, value)? {
                config.validation = ValidationMode::Strict;
            }
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            config.log_format = match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: ENV_LOG_FORMAT,
                        value,
                    });
                }
            };
        }
        Ok(config)
    }
}

fn parse_flag(variable: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid { variable, value }),
    }
}
