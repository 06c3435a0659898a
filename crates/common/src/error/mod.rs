//! Shared error vocabulary for Tripwire crates
//!
//! Each layer keeps its own error enum ([`ResilienceError`] for guarded
//! calls, `InfraError` for config and logging setup) and folds into
//! [`CommonError`] at the boundary. [`ErrorClassification`] lets callers
//! decide whether to retry or alert without matching on every enum.
//!
//! | Source | Variant |
//! |--------|---------|
//! | Breaker rejected the call | `CircuitBreakerOpen` |
//! | Guarded call missed its deadline | `Timeout` |
//! | Guarded call itself failed | `Backend` |
//! | Bad breaker or file settings | `Config` |
//! | Logging could not be installed | `Internal` |
//!
//! [`ResilienceError`]: crate::resilience::ResilienceError

use std::fmt;
use std::time::Duration;

/// Result alias over [`CommonError`]
pub type CommonResult<T> = Result<T, CommonError>;

/// Error shape shared by every Tripwire layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Settings were rejected
    Config {
        /// What was wrong
        message: String,
        /// Offending section or key, when known
        field: Option<String>,
    },

    /// A breaker shed the call
    CircuitBreakerOpen {
        /// Breaker name
        breaker: String,
        /// Time until the next probe, when known
        retry_after: Option<Duration>,
    },

    /// A guarded call ran past its deadline
    Timeout {
        /// Breaker name
        breaker: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// The guarded dependency reported a failure
    Backend {
        /// Dependency that failed
        dependency: String,
        /// Its error message
        message: String,
        /// Whether retrying may help
        is_retryable: bool,
    },

    /// Something Tripwire itself could not set up
    Internal {
        /// What went wrong
        message: String,
        /// Subsystem that raised it
        context: Option<String>,
    },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field: Some(field) } => {
                write!(f, "invalid setting '{field}': {message}")
            }
            Self::Config { message, field: None } => write!(f, "invalid settings: {message}"),
            Self::CircuitBreakerOpen { breaker, retry_after: Some(retry) } => {
                write!(f, "breaker '{breaker}' is open, next probe in {retry:?}")
            }
            Self::CircuitBreakerOpen { breaker, retry_after: None } => {
                write!(f, "breaker '{breaker}' is open")
            }
            Self::Timeout { breaker, after } => {
                write!(f, "call through '{breaker}' gave up after {after:?}")
            }
            Self::Backend { dependency, message, .. } => write!(f, "{dependency} failed: {message}"),
            Self::Internal { message, context: Some(ctx) } => write!(f, "{ctx}: {message}"),
            Self::Internal { message, context: None } => f.write_str(message),
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitBreakerOpen { .. } | Self::Timeout { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            Self::Config { .. } | Self::Internal { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitBreakerOpen { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Config { .. } | Self::Backend { .. } => ErrorSeverity::Error,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitBreakerOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl CommonError {
    /// Settings error without a field name
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Settings error naming the offending section or key
    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Deadline error for a call through `breaker`
    pub fn timeout(breaker: impl Into<String>, after: Duration) -> Self {
        Self::Timeout { breaker: breaker.into(), after }
    }

    /// Failure reported by the guarded dependency
    pub fn backend(
        dependency: impl Into<String>,
        message: impl Into<String>,
        is_retryable: bool,
    ) -> Self {
        Self::Backend { dependency: dependency.into(), message: message.into(), is_retryable }
    }

    /// Internal error tagged with the subsystem that raised it
    pub fn internal_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), context: Some(context.into()) }
    }
}

/// Retry and alerting hints shared by every error enum in the workspace
pub trait ErrorClassification {
    /// Whether the same call may succeed if tried again later
    fn is_retryable(&self) -> bool;

    /// Alerting level for this error
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error should page someone
    fn is_critical(&self) -> bool;

    /// Earliest sensible retry, when the error knows it
    fn retry_after(&self) -> Option<Duration>;
}

/// Alerting level, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Worth a debug line
    Info,
    /// Expected under load, watch the rate
    Warning,
    /// Needs attention
    Error,
    /// Needs attention now
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}
