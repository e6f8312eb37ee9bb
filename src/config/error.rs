//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed or is out of range.
    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The settings parse individually but do not form a usable configuration.
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl From<crate::error::Ge2eError> for ConfigError {
    fn from(err: crate::error::Ge2eError) -> Self {
        Self::Invalid {
            reason: err.to_string(),
        }
    }
}
