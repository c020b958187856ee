//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// Specialized Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
