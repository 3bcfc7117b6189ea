//! Shared helpers for `callguard-core` integration tests.
//!
//! Builds callers on a [`MockClock`] with a [`RecordingEventSink`] attached,
//! and provides operations that count invocations and concurrency.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callguard_common::observability::init_tracing;
use callguard_common::testing::RecordingEventSink;
use callguard_common::time::MockClock;
use callguard_core::config::{DependencySettings, ResilienceConfig};
use callguard_core::resilience::{
    CircuitBreakerConfig, DependencyRegistry, ResilientCaller, RetryPolicy,
};

/// Caller wired to a mock clock and a recording sink
pub struct Harness {
    pub caller: ResilientCaller<MockClock>,
    pub clock: MockClock,
    pub events: RecordingEventSink,
}

impl Harness {
    pub fn new(settings: DependencySettings) -> Self {
        Self::with_config(ResilienceConfig::default().with_defaults(settings))
    }

    pub fn with_config(config: ResilienceConfig) -> Self {
        // Only the first harness in a test binary installs the subscriber.
        let _ = init_tracing(Some("warn,callguard_core=debug"));
        let clock = MockClock::new();
        let events = RecordingEventSink::new();
        let registry = DependencyRegistry::with_clock(config, clock.clone())
            .expect("valid test config")
            .with_event_sink(Arc::new(events.clone()));
        Self { caller: ResilientCaller::new(Arc::new(registry)), clock, events }
    }
}

/// Breaker settings with a 30s open period
pub fn breaker(minimum_calls: u32, window: u32, threshold: f64, trials: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .minimum_calls(minimum_calls)
        .sliding_window_size(window)
        .failure_rate_threshold(threshold)
        .open_state_duration(Duration::from_secs(30))
        .half_open_permitted_calls(trials)
        .build()
        .expect("valid breaker config")
}

/// Retry policy without jitter
pub fn policy(max_attempts: u32, base_delay: Duration) -> RetryPolicy<&'static str> {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .base_delay(base_delay)
        .multiplier(2.0)
        .no_jitter()
        .build()
        .expect("valid retry policy")
}

/// Counts invocations and tracks the highest number running at once
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: AtomicU32,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl CallTracker {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark an invocation as running until the returned guard drops
    ///
    /// The guard also drops when the operation's future is cancelled, so an
    /// aborted call never stays counted as running.
    pub fn enter(self: &Arc<Self>) -> InFlight {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        InFlight { tracker: Arc::clone(self), call }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// One running invocation, see [`CallTracker::enter`]
#[derive(Debug)]
pub struct InFlight {
    tracker: Arc<CallTracker>,
    call: u32,
}

impl InFlight {
    /// 1-based invocation number
    pub fn call(&self) -> u32 {
        self.call
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.tracker.running.fetch_sub(1, Ordering::SeqCst);
    }
}
