//! Integration tests for the resilience module
//!
//! Exercises circuit breakers and the registry through the public API with
//! the failure scenarios they exist to contain.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tripwire_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, MockClock,
    ResilienceError, TripCheck,
};

/// Custom error type for testing
#[derive(Debug, Clone)]
struct TestError {
    message: String,
}

impl TestError {
    fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

fn outcome(success: bool) -> Result<u32, TestError> {
    if success {
        Ok(1)
    } else {
        Err(TestError::new("dependency failure"))
    }
}

/// Validates the trip-on-volume scenario: three failures below the volume
/// threshold keep the breaker CLOSED, and the fourth call (a success) trips
/// it because the post-outcome rate is 75%.
///
/// Assertions:
/// - State is CLOSED after three failures.
/// - State is OPEN after the fourth outcome.
/// - The next call is rejected without invoking the operation.
#[tokio::test(flavor = "multi_thread")]
async fn test_trip_on_call_reaching_volume_threshold() {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(50)
        .volume_threshold(4)
        .reset_timeout(Duration::from_millis(100))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::new("scenario", config).expect("breaker");
    assert_eq!(breaker.metrics().window_capacity, 20);

    for _ in 0..3 {
        let _ = breaker.execute(|| async { outcome(false) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = breaker.execute(|| async { outcome(true) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    let invoked = Arc::new(AtomicU32::new(0));
    let invoked_clone = Arc::clone(&invoked);
    let result = breaker
        .execute(|| async move {
            invoked_clone.fetch_add(1, Ordering::SeqCst);
            outcome(true)
        })
        .await;

    assert!(matches!(result, Err(ResilienceError::CircuitOpen { ref name, .. }) if name == "scenario"));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

/// Validates that `TripCheck::OnFailure` only evaluates the trip condition
/// when a failure is recorded.
///
/// Assertions:
/// - The success that reaches volume does not trip.
/// - The following failure does.
#[tokio::test]
async fn test_on_failure_trip_check_defers_to_next_failure() {
    let config = CircuitBreakerConfig::builder()
        .volume_threshold(4)
        .trip_check(TripCheck::OnFailure)
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::new("reference", config).expect("breaker");

    for success in [false, false, false, true] {
        let _ = breaker.execute(|| async move { outcome(success) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = breaker.execute(|| async { outcome(false) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Validates cold-start protection across mixed sequences that stay below
/// the volume threshold.
#[tokio::test]
async fn test_cold_start_sequences_never_trip() {
    let sequences: [&[bool]; 4] = [
        &[false; 9],
        &[true, false, false, false, false, false, false, false, false],
        &[false, true, false, true, false],
        &[],
    ];

    for sequence in sequences {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .volume_threshold(10)
            .build()
            .expect("valid config");
        let breaker = CircuitBreaker::new("cold", config).expect("breaker");

        for &success in sequence {
            let _ = breaker.execute(|| async move { outcome(success) }).await;
            assert_eq!(breaker.state(), CircuitState::Closed, "sequence {:?}", sequence);
        }
    }
}

/// Validates the OPEN -> HALF_OPEN -> OPEN -> HALF_OPEN -> CLOSED cycle with
/// a mock clock.
///
/// Assertions:
/// - Calls before the deadline are rejected with a shrinking `retry_after`.
/// - The call at the deadline proceeds and moves the breaker to HALF_OPEN.
/// - A probe failure re-opens with a fresh deadline.
/// - `success_threshold` probe successes close with zeroed counters.
#[tokio::test]
async fn test_full_recovery_cycle() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .volume_threshold(2)
        .success_threshold(2)
        .reset_timeout(Duration::from_secs(30))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::with_clock("cycle", config, clock.clone()).expect("breaker");

    for _ in 0..2 {
        let _ = breaker.execute(|| async { outcome(false) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(20));
    match breaker.execute(|| async { outcome(true) }).await {
        Err(ResilienceError::CircuitOpen { retry_after, .. }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(10)));
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    clock.advance(Duration::from_secs(10));
    let _ = breaker.execute(|| async { outcome(false) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(29));
    assert!(breaker.execute(|| async { outcome(true) }).await.is_err());

    clock.advance(Duration::from_secs(1));
    assert!(breaker.execute(|| async { outcome(true) }).await.is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(breaker.execute(|| async { outcome(true) }).await.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);

    let metrics = breaker.metrics();
    assert_eq!(metrics.consecutive_failures, 0);
    assert_eq!(metrics.consecutive_successes, 0);
    assert_eq!(metrics.rejected_calls, 2);
    assert_eq!(metrics.total_calls, 7);
}

/// Validates contention on a breaker that has just become due: every call is
/// either admitted as a probe or rejected, and failing probes leave it OPEN.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_due_breaker_admits_probe_under_contention() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .volume_threshold(1)
        .reset_timeout(Duration::from_secs(5))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::with_clock("probe", config, clock.clone()).expect("breaker");
    let _ = breaker.execute(|| async { outcome(false) }).await;
    clock.advance(Duration::from_secs(5));

    let invoked = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let breaker = breaker.clone();
        let invoked = Arc::clone(&invoked);
        handles.push(tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    outcome(false)
                })
                .await
        }));
    }
    for joined in join_all(handles).await {
        let _ = joined.expect("task");
    }

    // Every admitted probe fails and re-opens; HALF_OPEN admits whoever
    // arrives before that failure is recorded.
    let invoked = invoked.load(Ordering::SeqCst);
    assert!(invoked >= 1);
    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Open);
    assert_eq!(metrics.rejected_calls + u64::from(invoked), 16);
}

/// Validates that an operation taking twice the call timeout yields exactly
/// one timeout failure and never a success, even after it would have
/// resolved.
#[tokio::test(flavor = "multi_thread")]
async fn test_slow_call_recorded_as_single_timeout() {
    let config = CircuitBreakerConfig::builder()
        .call_timeout(Duration::from_millis(25))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::new("slow", config).expect("breaker");

    let result = breaker
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            outcome(true)
        })
        .await;

    assert!(result.as_ref().is_err_and(|err| err.is_timeout()));
    tokio::time::sleep(Duration::from_millis(75)).await;

    let metrics = breaker.metrics();
    assert_eq!(metrics.timed_out_calls, 1);
    assert_eq!(metrics.failed_calls, 1);
    assert_eq!(metrics.successful_calls, 0);
    assert_eq!(metrics.window_len, 1);
}

/// Validates that a failing fallback never replaces the original cause.
#[tokio::test]
async fn test_fallback_failure_keeps_primary_cause() {
    let breaker = CircuitBreaker::with_defaults("primary");

    let result = breaker
        .execute_with_fallback(
            || async { Err::<u32, _>(TestError::new("primary broke")) },
            || async { Err(TestError::new("fallback broke")) },
        )
        .await;

    let err = result.expect_err("both failed");
    assert_eq!(err.into_operation_error().expect("operation error").message, "primary broke");
}

/// Validates that `reset()` yields a clean CLOSED breaker from any state
/// while keeping cumulative counters.
#[tokio::test]
async fn test_reset_from_every_state() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .volume_threshold(1)
        .reset_timeout(Duration::from_secs(1))
        .build()
        .expect("valid config");

    for target in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
        let breaker =
            CircuitBreaker::with_clock("reset", config.clone(), clock.clone()).expect("breaker");
        if target != CircuitState::Closed {
            let _ = breaker.execute(|| async { outcome(false) }).await;
        }
        if target == CircuitState::HalfOpen {
            clock.advance(Duration::from_secs(1));
            let _ = breaker.execute(|| async { outcome(true) }).await;
        }
        assert_eq!(breaker.state(), target);
        let before = breaker.metrics();

        breaker.reset();

        let after = breaker.metrics();
        assert_eq!(after.state, CircuitState::Closed);
        assert!(breaker.is_healthy());
        assert_eq!(after.window_len, 0);
        assert_eq!(after.consecutive_failures, 0);
        assert_eq!(after.consecutive_successes, 0);
        assert_eq!(after.total_calls, before.total_calls);
        assert_eq!(after.failed_calls, before.failed_calls);
    }
}

/// Validates that the registry keeps the first configuration for a name.
#[tokio::test]
async fn test_registry_first_config_wins() {
    let registry = CircuitBreakerRegistry::new();
    let first = CircuitBreakerConfig::builder()
        .failure_threshold(25)
        .call_timeout(Duration::from_millis(500))
        .build()
        .expect("valid config");
    let second = CircuitBreakerConfig::builder()
        .failure_threshold(90)
        .call_timeout(Duration::from_secs(5))
        .build()
        .expect("valid config");

    let a = registry.get("db", Some(first)).expect("first get");
    let b = registry.get("db", Some(second)).expect("second get");

    assert_eq!(b.config().failure_threshold, 25);
    assert_eq!(b.config().call_timeout, Duration::from_millis(500));
    let _ = a.execute(|| async { outcome(true) }).await;
    assert_eq!(b.metrics().successful_calls, 1, "both handles share one breaker");
}

/// Validates that registry snapshots are owned copies and that
/// `reset_all` keeps every breaker registered.
#[tokio::test]
async fn test_registry_snapshots_and_reset_all() {
    let registry = CircuitBreakerRegistry::new();
    let tripping = CircuitBreakerConfig::builder().volume_threshold(1).build().expect("config");

    let _ = registry.execute("orders", || async { outcome(false) }, Some(tripping)).await;
    let _ = registry.execute("users", || async { outcome(true) }, None).await;

    let mut metrics = registry.all_metrics();
    let health = registry.health_status();
    assert_eq!(health.get("orders"), Some(&false));
    assert_eq!(health.get("users"), Some(&true));

    if let Some(snapshot) = metrics.get_mut("orders") {
        snapshot.state = CircuitState::Closed;
    }
    assert_eq!(registry.all_metrics()["orders"].state, CircuitState::Open);

    registry.reset_all();
    assert_eq!(registry.len(), 2);
    assert!(registry.health_status().values().all(|healthy| *healthy));
}
