//! Resilience benchmarks
//!
//! Hot paths of the breaker, gate and backoff, plus the full facade call.
//!
//! Run with: `cargo bench --bench resilience_bench -p callguard-core`

use std::future;
use std::time::Duration;

use callguard_common::time::MockClock;
use callguard_core::config::{DependencySettings, ResilienceConfig};
use callguard_core::resilience::{
    AttemptError, Backoff, CallOutcome, CircuitBreaker, CircuitBreakerConfig, ConcurrencyGate,
    DependencyName, Jitter, ResilientCaller, RetryPolicy,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker
// ============================================================================

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("acquire_and_record_success", |b| {
        let breaker =
            CircuitBreaker::new(DependencyName::from("bench"), CircuitBreakerConfig::default())
                .expect("valid breaker config for benchmarks");
        b.iter(|| {
            let mut permit = breaker.try_acquire().expect("closed breaker admits");
            permit.record(black_box(CallOutcome::Success));
        });
    });

    group.bench_function("open_rejection", |b| {
        let config = CircuitBreakerConfig::builder()
            .minimum_calls(1)
            .sliding_window_size(1)
            .open_state_duration(Duration::from_secs(3600))
            .build()
            .expect("valid breaker config for benchmarks");
        let breaker = CircuitBreaker::with_clock(DependencyName::from("bench"), config, MockClock::new())
            .expect("breaker should build");
        breaker.record_outcome(CallOutcome::Failure);

        b.iter(|| black_box(breaker.try_acquire().is_err()));
    });

    for window in [10u32, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("record_mixed", window), &window, |b, &window| {
            let config = CircuitBreakerConfig::builder()
                .minimum_calls(window)
                .sliding_window_size(window)
                .failure_rate_threshold(100.0)
                .build()
                .expect("valid breaker config for benchmarks");
            let breaker = CircuitBreaker::new(DependencyName::from("bench"), config)
                .expect("breaker should build");
            let mut i = 0u32;
            b.iter(|| {
                i = i.wrapping_add(1);
                let outcome = if i % 4 == 0 { CallOutcome::Failure } else { CallOutcome::Success };
                breaker.record_outcome(outcome);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Concurrency Gate
// ============================================================================

fn bench_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrency_gate");

    group.bench_function("try_acquire_release", |b| {
        let gate = ConcurrencyGate::new(DependencyName::from("bench"), 16).expect("gate should build");
        b.iter(|| {
            let permit = gate.try_acquire().expect("permit available");
            permit.release();
        });
    });

    group.bench_function("try_acquire_exhausted", |b| {
        let gate = ConcurrencyGate::new(DependencyName::from("bench"), 1).expect("gate should build");
        let _held = gate.try_acquire().expect("first permit");
        b.iter(|| black_box(gate.try_acquire().is_err()));
    });

    group.finish();
}

// ============================================================================
// Backoff
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff");

    for jitter in [Jitter::None, Jitter::Full, Jitter::Equal] {
        let backoff = Backoff { jitter, ..Backoff::default() };
        group.bench_with_input(BenchmarkId::new("next_delay", format!("{jitter:?}")), &backoff, |b, backoff| {
            b.iter(|| {
                for attempt in 1..=10 {
                    black_box(backoff.next_delay(black_box(attempt)));
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Facade
// ============================================================================

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn bench_facade(c: &mut Criterion) {
    let runtime = build_runtime();
    let mut group = c.benchmark_group("resilient_call");

    let never_open = CircuitBreakerConfig::builder()
        .failure_rate_threshold(100.0)
        .build()
        .expect("valid breaker config for benchmarks");
    let caller = ResilientCaller::from_config(ResilienceConfig::default().with_defaults(
        DependencySettings::default().with_max_permits(64).with_circuit_breaker(never_open),
    ))
    .expect("caller should build");
    let name = DependencyName::from("bench");
    let policy = RetryPolicy::<&'static str>::builder()
        .max_attempts(3)
        .base_delay(Duration::ZERO)
        .build()
        .expect("valid retry policy");
    let (caller, name, policy) = (&caller, &name, &policy);

    group.bench_function("success_first_attempt", |b| {
        b.to_async(&runtime).iter(|| async move {
            let result = caller
                .call(
                    name,
                    || future::ready(Ok::<_, AttemptError<&'static str>>(1u32)),
                    policy,
                    Duration::from_millis(10),
                )
                .await;
            black_box(result.is_ok())
        });
    });

    group.bench_function("success_after_two_retries", |b| {
        b.to_async(&runtime).iter(|| async move {
            let mut attempts = 0;
            let result = caller
                .call(
                    name,
                    || {
                        attempts += 1;
                        future::ready(if attempts < 3 { Err(AttemptError::transient("retry")) } else { Ok(()) })
                    },
                    policy,
                    Duration::from_millis(10),
                )
                .await;
            black_box(result.is_ok())
        });
    });

    group.finish();
}

criterion_group!(resilience, bench_circuit_breaker, bench_gate, bench_backoff, bench_facade);
criterion_main!(resilience);
