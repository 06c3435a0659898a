//! Time abstraction for breaker scheduling and metrics timestamps
//!
//! Breakers read two kinds of time: a monotonic [`Instant`] that decides when
//! an OPEN breaker may probe again, and a wall-clock UTC timestamp that is
//! reported in metrics snapshots. [`MockClock`] drives both from one elapsed
//! offset so tests can step through reset timeouts without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time for a breaker.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant, used for OPEN -> HALF_OPEN scheduling.
    fn now(&self) -> Instant;

    /// Current wall-clock time, used for metrics timestamps.
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        (**self).wall_clock()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same elapsed offset, so a test can hand one clone to a
/// breaker (or a registry) and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    epoch: DateTime<Utc>,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a clock anchored at the current instant and wall-clock time.
    pub fn new() -> Self {
        Self::anchored_at(Instant::now(), Utc::now())
    }

    /// Create a clock anchored at explicit monotonic and wall-clock origins.
    pub fn anchored_at(start: Instant, epoch: DateTime<Utc>) -> Self {
        Self { start, epoch, elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Move time forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Time elapsed since the clock was anchored.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.elapsed())
            .ok()
            .and_then(|offset| self.epoch.checked_add_signed(offset))
            .unwrap_or(self.epoch)
    }
}
