//! Circuit breaker guarding a single named dependency
//!
//! A breaker starts CLOSED and lets calls through while recording each outcome
//! in a sliding window. Once enough calls have been observed
//! (`volume_threshold`) and the window's failure percentage reaches
//! `failure_threshold`, it trips OPEN and rejects calls until `reset_timeout`
//! has elapsed. The first call after that moves it to HALF_OPEN: a single
//! failure re-opens it, `success_threshold` consecutive successes close it.
//!
//! All mutable state sits behind one mutex. Admission and outcome recording
//! are each a single critical section, and the lock is never held while the
//! guarded operation (or a fallback, or a user callback) runs.

use std::fmt;
use std::future::{Future, Ready};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::config::{CircuitBreakerConfig, FallbackReason, TripCheck};
use super::error::{ConfigResult, ResilienceError, ResilienceResult};
use super::window::OutcomeWindow;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through; outcomes feed the sliding window
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// Probe calls are let through to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time copy of a breaker's state and counters.
///
/// Cumulative counters survive [`CircuitBreaker::reset`]; only the window and
/// consecutive counters are cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker name
    pub name: String,
    /// State at snapshot time
    pub state: CircuitState,
    /// Every call that reached the breaker, rejected ones included
    pub total_calls: u64,
    /// Calls whose operation returned `Ok` in time
    pub successful_calls: u64,
    /// Calls that returned `Err` or timed out
    pub failed_calls: u64,
    /// Subset of `failed_calls` that hit `call_timeout`
    pub timed_out_calls: u64,
    /// Calls refused while OPEN
    pub rejected_calls: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Successes since the last failure or HALF_OPEN entry
    pub consecutive_successes: u32,
    /// Outcomes currently held by the sliding window
    pub window_len: usize,
    /// Maximum outcomes the window holds
    pub window_capacity: usize,
    /// Failures currently in the window
    pub window_failures: usize,
    /// Failure percentage of the sliding window
    pub failure_rate: f64,
    /// Wall-clock time of the most recent failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Wall-clock time of the most recent success
    pub last_success_time: Option<DateTime<Utc>>,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    /// Time since creation
    pub uptime: Duration,
    /// Time left before an OPEN breaker admits a probe
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Default)]
struct CallCounters {
    total: u64,
    successful: u64,
    failed: u64,
    timed_out: u64,
    rejected: u64,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failure_rate: f64,
}

enum Admission {
    Proceed,
    Reject { retry_after: Option<Duration> },
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    window: OutcomeWindow,
    /// `None` while OPEN means the reset timeout overflowed `Instant`
    next_attempt_at: Option<Instant>,
    counters: CallCounters,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
}

impl BreakerCore {
    fn new(window_capacity: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            window: OutcomeWindow::new(window_capacity),
            next_attempt_at: None,
            counters: CallCounters::default(),
            last_failure_time: None,
            last_success_time: None,
        }
    }

    fn should_trip(&self, config: &CircuitBreakerConfig) -> bool {
        self.counters.total >= u64::from(config.volume_threshold)
            && self.window.failure_rate_reaches(config.failure_threshold)
    }

    /// Moves to `to`, returning `None` when already there.
    fn transition(
        &mut self,
        to: CircuitState,
        now: Instant,
        reset_timeout: Duration,
    ) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }

        self.state = to;
        match to {
            CircuitState::Open => {
                self.next_attempt_at = now.checked_add(reset_timeout);
            }
            CircuitState::HalfOpen => {
                // Probation counts its own successes; the window is kept.
                self.consecutive_successes = 0;
                self.next_attempt_at = None;
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.next_attempt_at = None;
            }
        }

        Some(Transition { from, to, failure_rate: self.window.failure_rate() })
    }
}

struct Shared<C> {
    name: String,
    config: CircuitBreakerConfig,
    clock: C,
    created_at: DateTime<Utc>,
    created_instant: Instant,
    core: Mutex<BreakerCore>,
}

/// Named circuit breaker.
///
/// Cloning is cheap and yields a handle to the same breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    inner: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }

    /// Create a breaker with [`CircuitBreakerConfig::default`].
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::from_validated(name.into(), CircuitBreakerConfig::default(), SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker driven by `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, clock))
    }

    fn from_validated(name: String, config: CircuitBreakerConfig, clock: C) -> Self {
        let core = BreakerCore::new(config.window_capacity());
        Self {
            inner: Arc::new(Shared {
                name,
                created_at: clock.wall_clock(),
                created_instant: clock.now(),
                config,
                clock,
                core: Mutex::new(core),
            }),
        }
    }

    /// Name the breaker was registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Validated settings this breaker runs with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// Current state. Does not promote an overdue OPEN breaker; that happens
    /// on the next call.
    pub fn state(&self) -> CircuitState {
        self.inner.core.lock().state
    }

    /// OPEN is the only unhealthy state.
    pub fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Run `operation` under the breaker.
    ///
    /// # Errors
    /// - [`ResilienceError::CircuitOpen`] when the breaker rejects the call
    /// - [`ResilienceError::Timeout`] when `call_timeout` elapses first
    /// - [`ResilienceError::OperationFailed`] carrying the operation's error
    #[instrument(skip_all, fields(breaker = %self.inner.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, None::<fn() -> Ready<Result<T, E>>>).await
    }

    /// Run `operation` under the breaker, answering with `fallback` when the
    /// call is rejected or fails.
    ///
    /// If the fallback fails too, the original cause is returned and the
    /// fallback's own error is dropped.
    #[instrument(skip_all, fields(breaker = %self.inner.name))]
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (admission, transition) = self.admit();
        self.notify(transition);

        if let Admission::Reject { retry_after } = admission {
            debug!(breaker = %self.inner.name, ?retry_after, "circuit breaker rejecting call");
            let cause = ResilienceError::CircuitOpen { name: self.inner.name.clone(), retry_after };
            return self.fall_back(fallback, FallbackReason::CircuitOpen, cause).await;
        }

        let timeout = self.inner.config.call_timeout;
        // On timeout the operation future is dropped; anything it would have
        // produced later is discarded.
        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                let transition = self.record_success();
                self.notify(transition);
                Ok(value)
            }
            Ok(Err(error)) => {
                debug!(breaker = %self.inner.name, %error, "guarded operation failed");
                let transition = self.record_failure(false);
                self.notify(transition);
                let cause = ResilienceError::OperationFailed { source: error };
                self.fall_back(fallback, FallbackReason::OperationFailed, cause).await
            }
            Err(_elapsed) => {
                debug!(breaker = %self.inner.name, ?timeout, "guarded operation timed out");
                let transition = self.record_failure(true);
                self.notify(transition);
                let cause = ResilienceError::Timeout { name: self.inner.name.clone(), timeout };
                self.fall_back(fallback, FallbackReason::Timeout, cause).await
            }
        }
    }

    async fn fall_back<G, GFut, T, E>(
        &self,
        fallback: Option<G>,
        reason: FallbackReason,
        cause: ResilienceError<E>,
    ) -> ResilienceResult<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(fallback) = fallback else {
            return Err(cause);
        };

        if let Some(hook) = &self.inner.config.on_fallback {
            self.guard_callback("on_fallback", || hook(reason));
        }

        match fallback().await {
            Ok(value) => Ok(value),
            Err(fallback_error) => {
                debug!(
                    breaker = %self.inner.name,
                    error = %fallback_error,
                    "fallback failed, surfacing original cause"
                );
                Err(cause)
            }
        }
    }

    fn admit(&self) -> (Admission, Option<Transition>) {
        let now = self.inner.clock.now();
        let mut core = self.inner.core.lock();
        core.counters.total += 1;

        if core.state != CircuitState::Open {
            return (Admission::Proceed, None);
        }

        let next_attempt_at = core.next_attempt_at;
        match next_attempt_at {
            Some(at) if now >= at => {
                let transition =
                    core.transition(CircuitState::HalfOpen, now, self.inner.config.reset_timeout);
                (Admission::Proceed, transition)
            }
            pending => {
                core.counters.rejected += 1;
                let retry_after = pending.map(|at| at.saturating_duration_since(now));
                (Admission::Reject { retry_after }, None)
            }
        }
    }

    fn record_success(&self) -> Option<Transition> {
        let config = &self.inner.config;
        let now = self.inner.clock.now();
        let wall = self.inner.clock.wall_clock();
        let mut core = self.inner.core.lock();

        core.counters.successful += 1;
        core.consecutive_failures = 0;
        core.consecutive_successes = core.consecutive_successes.saturating_add(1);
        core.window.push(true);
        core.last_success_time = Some(wall);

        let state = core.state;
        match state {
            CircuitState::HalfOpen if core.consecutive_successes >= config.success_threshold => {
                core.transition(CircuitState::Closed, now, config.reset_timeout)
            }
            CircuitState::Closed
                if config.trip_check == TripCheck::EveryOutcome && core.should_trip(config) =>
            {
                core.transition(CircuitState::Open, now, config.reset_timeout)
            }
            _ => None,
        }
    }

    fn record_failure(&self, timed_out: bool) -> Option<Transition> {
        let config = &self.inner.config;
        let now = self.inner.clock.now();
        let wall = self.inner.clock.wall_clock();
        let mut core = self.inner.core.lock();

        core.counters.failed += 1;
        if timed_out {
            core.counters.timed_out += 1;
        }
        core.consecutive_successes = 0;
        core.consecutive_failures = core.consecutive_failures.saturating_add(1);
        core.window.push(false);
        core.last_failure_time = Some(wall);

        let state = core.state;
        match state {
            // Single strike while on probation
            CircuitState::HalfOpen => {
                core.transition(CircuitState::Open, now, config.reset_timeout)
            }
            CircuitState::Closed if core.should_trip(config) => {
                core.transition(CircuitState::Open, now, config.reset_timeout)
            }
            _ => None,
        }
    }

    /// Logs a transition and runs `on_state_change`. Must be called without
    /// the core lock held so callbacks can query the breaker.
    fn notify(&self, transition: Option<Transition>) {
        let Some(Transition { from, to, failure_rate }) = transition else {
            return;
        };
        let name = self.inner.name.as_str();

        match to {
            CircuitState::Open => {
                warn!(breaker = name, %from, %to, failure_rate, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                info!(breaker = name, %from, %to, "circuit breaker half-open, probing recovery");
            }
            CircuitState::Closed => {
                info!(breaker = name, %from, %to, "circuit breaker closed");
            }
        }

        if let Some(hook) = &self.inner.config.on_state_change {
            self.guard_callback("on_state_change", || hook(to));
        }
    }

    fn guard_callback(&self, hook: &'static str, callback: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            warn!(breaker = %self.inner.name, hook, "breaker callback panicked, ignoring");
        }
    }

    /// Force CLOSED and clear the window and consecutive counters.
    ///
    /// Cumulative call counters are kept.
    pub fn reset(&self) {
        let now = self.inner.clock.now();
        let mut core = self.inner.core.lock();
        core.window.clear();
        core.consecutive_failures = 0;
        core.consecutive_successes = 0;
        core.next_attempt_at = None;
        let transition = core.transition(CircuitState::Closed, now, self.inner.config.reset_timeout);
        drop(core);

        info!(breaker = %self.inner.name, "circuit breaker manually reset to closed state");
        self.notify(transition);
    }

    /// Owned snapshot of the current metrics.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.inner.clock.now();
        let core = self.inner.core.lock();

        let retry_after = match core.state {
            CircuitState::Open => core.next_attempt_at.map(|at| at.saturating_duration_since(now)),
            CircuitState::Closed | CircuitState::HalfOpen => None,
        };

        CircuitBreakerMetrics {
            name: self.inner.name.clone(),
            state: core.state,
            total_calls: core.counters.total,
            successful_calls: core.counters.successful,
            failed_calls: core.counters.failed,
            timed_out_calls: core.counters.timed_out,
            rejected_calls: core.counters.rejected,
            consecutive_failures: core.consecutive_failures,
            consecutive_successes: core.consecutive_successes,
            window_len: core.window.len(),
            window_capacity: core.window.capacity(),
            window_failures: core.window.failures(),
            failure_rate: core.window.failure_rate(),
            last_failure_time: core.last_failure_time,
            last_success_time: core.last_success_time,
            created_at: self.inner.created_at,
            uptime: now.saturating_duration_since(self.inner.created_instant),
            retry_after,
        }
    }
}
