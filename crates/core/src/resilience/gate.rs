//! Bounded concurrency gate
//!
//! A counting permit pool per dependency, sized from the downstream resource
//! limit (connection pool size, provider quota, ...). Waiters are served in
//! FIFO order by the underlying `tokio` semaphore.
//!
//! Permits are RAII guards: a [`GatePermit`] goes back to the pool exactly
//! once, either through [`GatePermit::release`] or when it is dropped. That
//! covers every exit path of the holder, including task cancellation.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callguard_common::observability::{EventSink, NoOpEventSink, ResilienceEvent, ResilienceEventKind};
use callguard_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::{ConfigError, ConfigResult};
use crate::resilience::dependency::DependencyName;

/// No permit became available within the wait budget
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("concurrency gate for '{dependency}' exhausted ({max_permits} permits, waited {waited:?})")]
pub struct GateExhausted {
    /// Gate owner
    pub dependency: DependencyName,
    /// Pool size
    pub max_permits: usize,
    /// Time spent waiting before giving up
    pub waited: Duration,
}

impl ErrorClassification for GateExhausted {
    fn is_retryable(&self) -> bool {
        true
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

}

impl From<GateExhausted> for CommonError {
    fn from(err: GateExhausted) -> Self {
        CommonError::concurrency_limit(err.dependency.as_str(), err.max_permits)
    }
}

#[derive(Debug, Default)]
struct GateCounters {
    in_flight: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time view of a gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateMetrics {
    /// Pool size
    pub max_permits: usize,
    /// Permits currently free
    pub available: usize,
    /// Permits currently held
    pub in_flight: usize,
    /// Successful acquisitions since creation
    pub acquired: u64,
    /// Permits returned since creation
    pub released: u64,
    /// Acquisitions that failed, fail-fast or timed out
    pub rejected: u64,
    /// Rejections caused by the wait budget elapsing
    pub timeouts: u64,
}

impl GateMetrics {
    /// Held permits as a fraction of the pool (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.max_permits == 0 {
            return 0.0;
        }
        self.in_flight as f64 / self.max_permits as f64
    }

    /// Rejections as a fraction of all acquisition attempts (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        let total = self.acquired + self.rejected;
        if total == 0 {
            return 0.0;
        }
        self.rejected as f64 / total as f64
    }

    /// Whether every permit is held
    pub fn is_at_capacity(&self) -> bool {
        self.available == 0
    }

    /// Human-readable one-line summary
    pub fn status_message(&self) -> String {
        format!(
            "Gate: {}/{} in flight ({:.1}% utilized), {} rejected, {} timeouts",
            self.in_flight,
            self.max_permits,
            self.utilization() * 100.0,
            self.rejected,
            self.timeouts
        )
    }
}

/// Permit pool for one dependency
///
/// Cloning yields another handle to the same pool.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use callguard_core::resilience::{ConcurrencyGate, DependencyName};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gate = ConcurrencyGate::new(DependencyName::from("payments"), 2)?;
///
/// let permit = gate.acquire(Duration::from_millis(100)).await?;
/// assert_eq!(gate.available(), 1);
/// permit.release();
/// assert_eq!(gate.available(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConcurrencyGate {
    dependency: DependencyName,
    max_permits: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<GateCounters>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("dependency", &self.dependency)
            .field("max_permits", &self.max_permits)
            .field("available", &self.available())
            .finish()
    }
}

impl ConcurrencyGate {
    /// Create a gate with `max_permits` permits
    pub fn new(dependency: DependencyName, max_permits: usize) -> ConfigResult<Self> {
        Self::with_event_sink(dependency, max_permits, Arc::new(NoOpEventSink))
    }

    /// Create a gate that reports rejections to `events`
    pub fn with_event_sink(
        dependency: DependencyName,
        max_permits: usize,
        events: Arc<dyn EventSink>,
    ) -> ConfigResult<Self> {
        if max_permits == 0 {
            return Err(ConfigError::invalid("max_permits", "must be greater than 0"));
        }
        if max_permits > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_permits",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(Self::from_validated(dependency, max_permits, events))
    }

    pub(crate) fn from_validated(
        dependency: DependencyName,
        max_permits: usize,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            dependency,
            max_permits,
            semaphore: Arc::new(Semaphore::new(max_permits)),
            counters: Arc::new(GateCounters::default()),
            events,
        }
    }

    /// Acquire a permit, waiting at most `timeout`
    ///
    /// A zero timeout fails fast when no permit is free.
    pub async fn acquire(&self, timeout: Duration) -> Result<GatePermit, GateExhausted> {
        if timeout.is_zero() {
            return self.try_acquire();
        }

        let started = tokio::time::Instant::now();
        let semaphore = Arc::clone(&self.semaphore);
        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(self.admit(permit)),
            Ok(Err(_closed)) => Err(self.reject(started.elapsed(), false)),
            Err(_elapsed) => Err(self.reject(started.elapsed(), true)),
        }
    }

    /// Acquire a permit without waiting
    pub fn try_acquire(&self) -> Result<GatePermit, GateExhausted> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(self.admit(permit)),
            Err(_) => Err(self.reject(Duration::ZERO, false)),
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(dependency = %self.dependency, in_flight, "gate permit acquired");
        GatePermit { _permit: permit, counters: Arc::clone(&self.counters) }
    }

    fn reject(&self, waited: Duration, timed_out: bool) -> GateExhausted {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        warn!(
            dependency = %self.dependency,
            max_permits = self.max_permits,
            waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            "gate exhausted"
        );
        self.events.emit(ResilienceEvent::new(&self.dependency, ResilienceEventKind::GateRejected));
        GateExhausted { dependency: self.dependency.clone(), max_permits: self.max_permits, waited }
    }

    /// Gate owner
    pub fn dependency(&self) -> &DependencyName {
        &self.dependency
    }

    /// Pool size
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of counters
    pub fn metrics(&self) -> GateMetrics {
        GateMetrics {
            max_permits: self.max_permits,
            available: self.available(),
            in_flight: self.in_flight(),
            acquired: self.counters.acquired.load(Ordering::Acquire),
            released: self.counters.released.load(Ordering::Acquire),
            rejected: self.counters.rejected.load(Ordering::Acquire),
            timeouts: self.counters.timeouts.load(Ordering::Acquire),
        }
    }
}

/// Held gate permit; returned to the pool on [`release`](Self::release) or drop
#[must_use = "dropping the permit releases it immediately"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl GatePermit {
    /// Return the permit to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}
