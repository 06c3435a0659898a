//! Breaker configuration and its serde-friendly settings twin

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::CircuitState;
use super::error::{ConfigError, ConfigResult};

/// Lower bound on the sliding window capacity.
pub const MIN_WINDOW_CAPACITY: usize = 20;

/// Default failure-rate threshold, in percent.
pub const DEFAULT_FAILURE_THRESHOLD: u8 = 50;
/// Default number of consecutive HALF_OPEN successes needed to close.
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;
/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// Default time an OPEN breaker waits before probing.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
/// Default minimum call volume before trip decisions are made.
pub const DEFAULT_VOLUME_THRESHOLD: u32 = 10;

/// Why a fallback is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The breaker rejected the call without running the operation.
    CircuitOpen,
    /// The operation exceeded the call timeout.
    Timeout,
    /// The operation returned an error.
    OperationFailed,
}

/// When a CLOSED breaker re-evaluates its trip condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripCheck {
    /// Only after a recorded failure.
    OnFailure,
    /// After every recorded outcome, successes included.
    #[default]
    EveryOutcome,
}

/// Invoked with the new state whenever a breaker actually changes state.
pub type StateChangeCallback = Arc<dyn Fn(CircuitState) + Send + Sync>;

/// Invoked just before a fallback runs.
pub type FallbackCallback = Arc<dyn Fn(FallbackReason) + Send + Sync>;

/// Immutable configuration of a single breaker.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) of the sliding window that trips the breaker
    pub failure_threshold: u8,
    /// Consecutive HALF_OPEN successes required to close
    pub success_threshold: u32,
    /// Deadline for a single guarded call
    pub call_timeout: Duration,
    /// How long the breaker stays OPEN before allowing a probe
    pub reset_timeout: Duration,
    /// Minimum number of calls before the trip condition is trusted; also
    /// sizes the sliding window
    pub volume_threshold: u32,
    /// Which outcomes re-evaluate the trip condition while CLOSED
    pub trip_check: TripCheck,
    /// Called after every state change, outside the breaker lock
    pub on_state_change: Option<StateChangeCallback>,
    /// Called with the reason before a fallback runs
    pub on_fallback: Option<FallbackCallback>,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("call_timeout", &self.call_timeout)
            .field("reset_timeout", &self.reset_timeout)
            .field("volume_threshold", &self.volume_threshold)
            .field("trip_check", &self.trip_check)
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_fallback", &self.on_fallback.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            trip_check: TripCheck::default(),
            on_state_change: None,
            on_fallback: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Capacity of the sliding outcome window.
    pub fn window_capacity(&self) -> usize {
        (self.volume_threshold as usize).max(MIN_WINDOW_CAPACITY)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold > 100 {
            return Err(ConfigError::invalid(format!(
                "failure_threshold must be between 0 and 100, got {}",
                self.failure_threshold
            )));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }

        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid("call_timeout must be greater than 0"));
        }

        if self.volume_threshold == 0 {
            return Err(ConfigError::invalid("volume_threshold must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Builder seeded with [`CircuitBreakerConfig::default`]
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Failure percentage (0-100) of the window that trips the breaker
    pub fn failure_threshold(mut self, percent: u8) -> Self {
        self.config.failure_threshold = percent;
        self
    }

    /// HALF_OPEN successes needed to close
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Deadline for each guarded call
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Time spent OPEN before a probe is admitted
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Calls observed before the breaker may trip
    pub fn volume_threshold(mut self, threshold: u32) -> Self {
        self.config.volume_threshold = threshold;
        self
    }

    /// Outcomes that re-evaluate the trip condition
    pub fn trip_check(mut self, trip_check: TripCheck) -> Self {
        self.config.trip_check = trip_check;
        self
    }

    /// Observe state changes
    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.config.on_state_change = Some(Arc::new(callback));
        self
    }

    /// Observe fallback invocations
    pub fn on_fallback<F>(mut self, callback: F) -> Self
    where
        F: Fn(FallbackReason) + Send + Sync + 'static,
    {
        self.config.on_fallback = Some(Arc::new(callback));
        self
    }

    /// Validate and return the config
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Plain-data breaker settings as they appear in config files.
///
/// Every field is optional; [`BreakerSettings::into_config`] fills the gaps
/// from [`CircuitBreakerConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    /// See [`CircuitBreakerConfig::failure_threshold`]
    pub failure_threshold: Option<u8>,
    /// See [`CircuitBreakerConfig::success_threshold`]
    pub success_threshold: Option<u32>,
    /// [`CircuitBreakerConfig::call_timeout`] in milliseconds
    pub call_timeout_ms: Option<u64>,
    /// [`CircuitBreakerConfig::reset_timeout`] in milliseconds
    pub reset_timeout_ms: Option<u64>,
    /// See [`CircuitBreakerConfig::volume_threshold`]
    pub volume_threshold: Option<u32>,
    /// See [`CircuitBreakerConfig::trip_check`]
    pub trip_check: Option<TripCheck>,
}

impl BreakerSettings {
    /// Fields set in `self` win; the rest come from `base`.
    pub fn merged_over(&self, base: &BreakerSettings) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.or(base.failure_threshold),
            success_threshold: self.success_threshold.or(base.success_threshold),
            call_timeout_ms: self.call_timeout_ms.or(base.call_timeout_ms),
            reset_timeout_ms: self.reset_timeout_ms.or(base.reset_timeout_ms),
            volume_threshold: self.volume_threshold.or(base.volume_threshold),
            trip_check: self.trip_check.or(base.trip_check),
        }
    }

    /// Build a validated config, applying defaults for omitted fields.
    pub fn into_config(&self) -> ConfigResult<CircuitBreakerConfig> {
        let defaults = CircuitBreakerConfig::default();
        let config = CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(defaults.success_threshold),
            call_timeout: self
                .call_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            reset_timeout: self
                .reset_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_timeout),
            volume_threshold: self.volume_threshold.unwrap_or(defaults.volume_threshold),
            trip_check: self.trip_check.unwrap_or(defaults.trip_check),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }
}
