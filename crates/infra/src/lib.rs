//! # Tripwire Infrastructure
//!
//! Wiring around `tripwire-common`:
//! - Configuration loading from the environment or JSON/TOML files
//! - Tracing subscriber setup
//! - Building a [`CircuitBreakerRegistry`](tripwire_common::resilience::CircuitBreakerRegistry)
//!   from configuration

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod observability;

// Re-export commonly used items
pub use bootstrap::{build_registry, build_registry_with_clock};
pub use config::{LoggingConfig, TripwireConfig};
pub use errors::{InfraError, InfraResult};
pub use observability::init_tracing;
