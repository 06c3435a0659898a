//! Errors returned by breakers and the registry
//!
//! [`ResilienceError`] wraps the caller's own error type so a failed
//! operation comes back unchanged, next to the breaker's own rejection and
//! timeout outcomes. [`ConfigError`] covers settings rejected at
//! construction time.

use std::time::Duration;

use thiserror::Error;

use crate::error::{CommonError, ErrorClassification, ErrorSeverity};

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting is out of range
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What was wrong
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by a guarded call.
///
/// Generic over the operation's own error type `E`, which is carried
/// untouched in [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker is OPEN and not yet due for a probe.
    #[error("Circuit breaker '{name}' is open, rejecting calls")]
    CircuitOpen {
        /// Breaker that rejected the call
        name: String,
        /// Time until a probe is admitted; `None` if unknown
        retry_after: Option<Duration>,
    },

    /// The operation did not complete within the breaker's call timeout.
    #[error("Circuit breaker '{name}' timed out after {timeout:?}")]
    Timeout {
        /// Breaker whose deadline elapsed
        name: String,
        /// The configured `call_timeout`
        timeout: Duration,
    },

    /// The operation itself failed.
    #[error("Operation failed: {source}")]
    OperationFailed {
        /// The operation's own error
        #[source]
        source: E,
    },

    /// A breaker could not be created from the supplied configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong
        message: String,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns `true` for [`ResilienceError::CircuitOpen`].
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` for [`ResilienceError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The operation's own error, if that is what this is.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }

    /// Unwraps the operation's own error, handing `self` back otherwise.
    pub fn into_operation_error(self) -> Result<E, Self> {
        match self {
            Self::OperationFailed { source } => Ok(source),
            other => Err(other),
        }
    }
}

impl<E> From<ConfigError> for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { message } => Self::InvalidConfiguration { message },
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::OperationFailed { .. } | Self::InvalidConfiguration { .. } => {
                ErrorSeverity::Error
            }
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl<E> From<ResilienceError<E>> for CommonError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: ResilienceError<E>) -> Self {
        match err {
            ResilienceError::CircuitOpen { name, retry_after } => {
                Self::CircuitBreakerOpen { breaker: name, retry_after }
            }
            ResilienceError::Timeout { name, timeout } => Self::timeout(name, timeout),
            ResilienceError::OperationFailed { source } => {
                Self::backend("operation", source.to_string(), false)
            }
            ResilienceError::InvalidConfiguration { message } => Self::config(message),
        }
    }
}

/// Result type for guarded calls
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
