//! Infrastructure error type and its conversion into the shared vocabulary.

use thiserror::Error;
use tripwire_common::error::CommonError;
use tripwire_common::resilience::ConfigError;

/// Errors raised while loading configuration, installing tracing, or
/// building breakers from configuration.
#[derive(Debug, Error)]
pub enum InfraError {
    /// Configuration could not be found, read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings for a named breaker (or the defaults) failed validation
    #[error("Invalid breaker settings for '{name}': {source}")]
    Breaker {
        /// Breaker name, or `defaults`
        name: String,
        /// Validation failure
        #[source]
        source: ConfigError,
    },

    /// A global tracing subscriber could not be installed
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl InfraError {
    pub(crate) fn breaker(name: impl Into<String>, source: ConfigError) -> Self {
        Self::Breaker { name: name.into(), source }
    }
}

impl From<InfraError> for CommonError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Config(message) => CommonError::config(message),
            InfraError::Breaker { name, source } => CommonError::config_field(name, source.to_string()),
            InfraError::Tracing(message) => {
                CommonError::internal_with_context(message, "observability")
            }
        }
    }
}

/// Convenience type alias for infrastructure operations
pub type InfraResult<T> = Result<T, InfraError>;
