//! Registry construction from loaded configuration.

use tripwire_common::resilience::{CircuitBreakerRegistry, Clock, SystemClock};

use crate::config::{TripwireConfig, DEFAULTS_SECTION};
use crate::errors::{InfraError, InfraResult};

/// Build a registry whose default config comes from `config.defaults` and
/// with every breaker under `config.breakers` pre-registered.
///
/// # Errors
/// Returns `InfraError::Breaker` naming the first invalid section.
pub fn build_registry(config: &TripwireConfig) -> InfraResult<CircuitBreakerRegistry> {
    build_registry_with_clock(config, SystemClock)
}

/// [`build_registry`] with an explicit clock.
pub fn build_registry_with_clock<C: Clock + Clone>(
    config: &TripwireConfig,
    clock: C,
) -> InfraResult<CircuitBreakerRegistry<C>> {
    let mut registry = CircuitBreakerRegistry::with_clock(clock);
    registry
        .set_default_config(config.default_breaker_config()?)
        .map_err(|source| InfraError::breaker(DEFAULTS_SECTION, source))?;

    let mut names: Vec<&String> = config.breakers.keys().collect();
    names.sort();
    for name in names {
        let breaker_config = config.breaker_config(name)?;
        registry
            .get(name, Some(breaker_config))
            .map_err(|source| InfraError::breaker(name.as_str(), source))?;
    }

    tracing::info!(breakers = registry.len(), "Circuit breaker registry ready");
    Ok(registry)
}
