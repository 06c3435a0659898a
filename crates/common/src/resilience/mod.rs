//! Circuit breakers for calls to unreliable dependencies
//!
//! - [`CircuitBreaker`]: a named breaker with a sliding failure window, call
//!   timeout, optional fallback and observer callbacks
//! - [`CircuitBreakerRegistry`]: one breaker per dependency name, created on
//!   first use
//!
//! Breakers are generic over a [`Clock`] so tests can drive reset timeouts
//! with [`MockClock`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tripwire_common::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig::builder()
//!     .failure_threshold(50)
//!     .volume_threshold(10)
//!     .call_timeout(Duration::from_secs(2))
//!     .build()?;
//! let breaker = CircuitBreaker::new("payments", config)?;
//!
//! let reply = breaker.execute(|| async { Ok::<_, std::io::Error>("ok") }).await?;
//! assert_eq!(reply, "ok");
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod registry;
mod window;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{
    BreakerSettings, CircuitBreakerConfig, CircuitBreakerConfigBuilder, FallbackCallback,
    FallbackReason, StateChangeCallback, TripCheck, MIN_WINDOW_CAPACITY,
};
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use registry::CircuitBreakerRegistry;
