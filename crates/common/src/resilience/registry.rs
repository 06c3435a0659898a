//! Named collection of circuit breakers
//!
//! One breaker per dependency name. The first lookup for a name creates the
//! breaker with whatever config it supplies (or the registry default); later
//! lookups get the same breaker and their config is ignored.

use std::collections::HashMap;
use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
use super::clock::{Clock, SystemClock};
use super::config::CircuitBreakerConfig;
use super::error::{ConfigResult, ResilienceResult};

/// Registry of breakers keyed by name.
///
/// Breakers are never evicted implicitly; use [`remove`](Self::remove).
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    breakers: DashMap<String, CircuitBreaker<C>>,
    default_config: CircuitBreakerConfig,
    clock: C,
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Empty registry on the system clock with default breaker settings.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Registry whose breakers use `config` when a lookup supplies none.
    pub fn with_default_config(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { default_config: config, ..Self::new() })
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.names())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    /// Registry whose breakers share `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self { breakers: DashMap::new(), default_config: CircuitBreakerConfig::default(), clock }
    }

    /// Replace the default config used for breakers created from now on.
    pub fn set_default_config(&mut self, config: CircuitBreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        self.default_config = config;
        Ok(())
    }

    /// Settings used when a lookup supplies none.
    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Return the breaker registered under `name`, creating it if absent.
    ///
    /// `config` only matters for the call that creates the breaker.
    ///
    /// # Errors
    /// Returns [`ConfigError`](super::ConfigError) when the breaker has to be
    /// created and `config` is invalid. Nothing is registered in that case.
    pub fn get(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> ConfigResult<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(name) {
            if config.is_some() {
                debug!(breaker = name, "breaker already registered, ignoring supplied config");
            }
            return Ok(existing.clone());
        }

        match self.breakers.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                if config.is_some() {
                    debug!(breaker = name, "breaker already registered, ignoring supplied config");
                }
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let config = config.unwrap_or_else(|| self.default_config.clone());
                let breaker = CircuitBreaker::with_clock(name, config, self.clock.clone())?;
                info!(breaker = name, "registered circuit breaker");
                entry.insert(breaker.clone());
                Ok(breaker)
            }
        }
    }

    /// Run `operation` through the breaker named `name`.
    ///
    /// An invalid `config` for a new breaker surfaces as
    /// [`ResilienceError::InvalidConfiguration`](super::ResilienceError::InvalidConfiguration).
    pub async fn execute<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let breaker = self.get(name, config)?;
        breaker.execute(operation).await
    }

    /// Run `operation` through the breaker named `name`, answering with
    /// `fallback` on rejection or failure.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        name: &str,
        operation: F,
        fallback: G,
        config: Option<CircuitBreakerConfig>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let breaker = self.get(name, config)?;
        breaker.execute_with_fallback(operation, fallback).await
    }

    /// Owned metrics snapshot for every breaker.
    pub fn all_metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().metrics())).collect()
    }

    /// `name -> is_healthy` for every breaker.
    pub fn health_status(&self) -> HashMap<String, bool> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().is_healthy()))
            .collect()
    }

    /// Names of breakers currently OPEN.
    pub fn open_breakers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Reset every registered breaker. Nothing is removed.
    pub fn reset_all(&self) {
        // Collect first so breaker callbacks run without a shard lock held.
        let breakers: Vec<CircuitBreaker<C>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();
        for breaker in &breakers {
            breaker.reset();
        }
        info!(count = breakers.len(), "reset all circuit breakers");
    }

    /// Whether a breaker is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker is registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Drop the breaker registered under `name`. Handles already handed out
    /// keep working but are no longer reachable through the registry.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker<C>> {
        let removed = self.breakers.remove(name).map(|(_, breaker)| breaker);
        if removed.is_some() {
            info!(breaker = name, "removed circuit breaker");
        }
        removed
    }
}
