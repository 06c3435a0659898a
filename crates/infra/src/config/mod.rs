//! Configuration loading and management
//!
//! [`TripwireConfig`] is the file/env representation of a deployment: logging
//! options, default breaker settings, and per-breaker overrides.

pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tripwire_common::resilience::{BreakerSettings, CircuitBreakerConfig};

use crate::errors::{InfraError, InfraResult};

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

/// Name reported for errors in the `defaults` section.
pub const DEFAULTS_SECTION: &str = "defaults";

/// Logging options consumed by [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `tripwire_common=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TripwireConfig {
    /// Log level and output format
    pub logging: LoggingConfig,
    /// Settings applied to every breaker unless overridden
    pub defaults: BreakerSettings,
    /// Per-breaker overrides keyed by breaker name
    pub breakers: HashMap<String, BreakerSettings>,
}

impl TripwireConfig {
    /// Breaker config built from the `defaults` section alone.
    ///
    /// # Errors
    /// Returns [`InfraError::Breaker`] naming the `defaults` section.
    pub fn default_breaker_config(&self) -> InfraResult<CircuitBreakerConfig> {
        self.defaults.into_config().map_err(|source| InfraError::breaker(DEFAULTS_SECTION, source))
    }

    /// Breaker config for `name`: its overrides layered over `defaults`.
    /// Unknown names get the defaults.
    ///
    /// # Errors
    /// Returns [`InfraError::Breaker`] naming the breaker.
    pub fn breaker_config(&self, name: &str) -> InfraResult<CircuitBreakerConfig> {
        match self.breakers.get(name) {
            Some(settings) => settings
                .merged_over(&self.defaults)
                .into_config()
                .map_err(|source| InfraError::breaker(name, source)),
            None => self.default_breaker_config(),
        }
    }

    /// Check the defaults and every named breaker.
    pub fn validate(&self) -> InfraResult<()> {
        self.default_breaker_config()?;
        let mut names: Vec<&String> = self.breakers.keys().collect();
        names.sort();
        for name in names {
            self.breaker_config(name)?;
        }
        Ok(())
    }
}
