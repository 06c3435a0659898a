//! Tracing subscriber setup
//!
//! Breakers log through `tracing`; this installs the process-wide subscriber
//! that turns those events into human-readable or JSON lines.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::errors::{InfraError, InfraResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` when it is set.
///
/// # Errors
/// Returns `InfraError::Tracing` if the level directive is invalid or a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> InfraResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for_level(&config.level)?,
    };

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
    };
    installed.map_err(|e| InfraError::Tracing(e.to_string()))?;

    tracing::info!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}

fn filter_for_level(level: &str) -> InfraResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| InfraError::Tracing(format!("Invalid log level '{}': {}", level, e)))
}
