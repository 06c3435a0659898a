//! Circuit breaker and registry benchmarks
//!
//! Covers the guarded-call hot paths (CLOSED success, OPEN rejection), the
//! trip transition, and registry lookups.
//!
//! Run with: `cargo bench --bench resilience_bench -p tripwire-common`

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;
use tripwire_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, MockClock,
};

#[derive(Debug, Clone)]
struct BenchError(&'static str);

impl Display for BenchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for BenchError {}

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn tripping_config(volume: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .volume_threshold(volume)
        .reset_timeout(Duration::from_secs(3600))
        .build()
        .expect("valid circuit breaker config for benchmarks")
}

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_paths");
    let runtime = build_runtime();

    group.bench_function("closed_success", |b| {
        let breaker = CircuitBreaker::with_defaults("bench");
        b.to_async(&runtime).iter(|| async {
            let result = breaker.execute(|| async { Ok::<_, BenchError>(1u32) }).await;
            black_box(result.is_ok())
        });
    });

    group.bench_function("open_rejection", |b| {
        let breaker = CircuitBreaker::with_clock("bench", tripping_config(1), MockClock::new())
            .expect("breaker should build");
        runtime.block_on(async {
            let _ = breaker.execute(|| async { Err::<u32, _>(BenchError("trip")) }).await;
        });
        b.to_async(&runtime).iter(|| async {
            let result = breaker.execute(|| async { Ok::<_, BenchError>(1u32) }).await;
            black_box(result.is_err())
        });
    });

    group.bench_function("open_fallback", |b| {
        let breaker = CircuitBreaker::with_clock("bench", tripping_config(1), MockClock::new())
            .expect("breaker should build");
        runtime.block_on(async {
            let _ = breaker.execute(|| async { Err::<u32, _>(BenchError("trip")) }).await;
        });
        b.to_async(&runtime).iter(|| async {
            let result = breaker
                .execute_with_fallback(
                    || async { Ok::<_, BenchError>(1u32) },
                    || async { Ok(0u32) },
                )
                .await;
            black_box(result)
        });
    });

    group.finish();
}

fn bench_circuit_breaker_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_trip");
    let runtime = build_runtime();

    for volume in [4u32, 20, 100] {
        group.bench_with_input(BenchmarkId::new("fail_to_open", volume), &volume, |b, &volume| {
            b.to_async(&runtime).iter(|| async move {
                let breaker = CircuitBreaker::new("bench", tripping_config(volume))
                    .expect("breaker should build");
                for _ in 0..volume {
                    let _ = breaker.execute(|| async { Err::<u32, _>(BenchError("fail")) }).await;
                }
                black_box(breaker.state())
            });
        });
    }

    group.bench_function("metrics_snapshot", |b| {
        let breaker = CircuitBreaker::with_defaults("bench");
        b.iter(|| black_box(breaker.metrics()));
    });

    group.finish();
}

// ============================================================================
// Registry Benchmarks
// ============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for size in [1usize, 64, 1024] {
        let registry = CircuitBreakerRegistry::new();
        for i in 0..size {
            registry.get(&format!("svc-{i}"), None).expect("default config is valid");
        }

        group.bench_with_input(BenchmarkId::new("get_existing", size), &size, |b, _| {
            b.iter(|| black_box(registry.get("svc-0", None)));
        });

        group.bench_with_input(BenchmarkId::new("health_status", size), &size, |b, _| {
            b.iter(|| black_box(registry.health_status()));
        });
    }

    group.finish();
}

criterion_group!(
    resilience,
    bench_circuit_breaker_paths,
    bench_circuit_breaker_trip,
    bench_registry
);
criterion_main!(resilience);
