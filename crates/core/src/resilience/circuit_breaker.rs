//! Sliding-window circuit breaker
//!
//! One breaker guards one dependency. It keeps the outcomes of the last
//! `sliding_window_size` attempts and moves through three states:
//!
//! ```text
//!            failure rate >= threshold
//!            (and >= minimum_calls observed)
//!   CLOSED ─────────────────────────────────► OPEN
//!     ▲                                       │  ▲
//!     │ half_open_permitted_calls             │  │ any trial
//!     │ trial successes                       │  │ failure
//!     │                open_state_duration    ▼  │
//!     └────────────────────────────────── HALF_OPEN
//! ```
//!
//! All reads and writes of the window and the state happen under a single
//! `parking_lot::Mutex`, so every operation is atomic with respect to every
//! other. The lock is never held across an `.await`.
//!
//! Every transition bumps a generation counter. A [`BreakerPermit`]
//! remembers the generation it was issued under; its observations are
//! dropped once the breaker has moved on, so a slow call that started before
//! the circuit opened cannot skew the half-open probe that follows.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use callguard_common::observability::{EventSink, NoOpEventSink, ResilienceEvent, ResilienceEventKind};
use callguard_common::time::{Clock, SystemClock};
use callguard_common::{CommonError, ErrorClassification, ErrorSeverity};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConfigResult};
use crate::resilience::dependency::DependencyName;
use crate::resilience::outcome::CallOutcome;
use crate::resilience::window::SlidingWindow;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow, outcomes are recorded
    Closed,
    /// Calls are rejected until the open duration elapses
    Open,
    /// A limited number of trial calls probe the dependency
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

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failure percentage in `(0, 100]` that opens the circuit
    pub failure_rate_threshold: f64,
    /// Outcomes required in the window before the rate is evaluated
    pub minimum_calls: u32,
    /// Number of most recent outcomes considered
    pub sliding_window_size: u32,
    /// Time spent OPEN before trial calls are admitted
    #[serde(rename = "open_state_duration_ms", with = "callguard_common::duration_millis")]
    pub open_state_duration: Duration,
    /// Trial calls admitted in HALF_OPEN, and successes needed to close
    pub half_open_permitted_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_calls: 10,
            sliding_window_size: 100,
            open_state_duration: Duration::from_secs(30),
            half_open_permitted_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with validation
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let threshold = self.failure_rate_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 100.0 {
            return Err(ConfigError::invalid(
                "failure_rate_threshold",
                format!("must be in (0, 100], got {threshold}"),
            ));
        }

        if self.minimum_calls == 0 {
            return Err(ConfigError::invalid("minimum_calls", "must be greater than 0"));
        }

        if self.sliding_window_size == 0 {
            return Err(ConfigError::invalid("sliding_window_size", "must be greater than 0"));
        }

        if self.minimum_calls > self.sliding_window_size {
            return Err(ConfigError::invalid(
                "minimum_calls",
                format!(
                    "must not exceed sliding_window_size ({} > {})",
                    self.minimum_calls, self.sliding_window_size
                ),
            ));
        }

        if self.half_open_permitted_calls == 0 {
            return Err(ConfigError::invalid(
                "half_open_permitted_calls",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    pub fn minimum_calls(mut self, calls: u32) -> Self {
        self.config.minimum_calls = calls;
        self
    }

    pub fn sliding_window_size(mut self, size: u32) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    pub fn open_state_duration(mut self, duration: Duration) -> Self {
        self.config.open_state_duration = duration;
        self
    }

    pub fn half_open_permitted_calls(mut self, calls: u32) -> Self {
        self.config.half_open_permitted_calls = calls;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The breaker refused the call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for '{dependency}'")]
pub struct CircuitOpenError {
    /// Breaker owner
    pub dependency: DependencyName,
    /// Time until trial calls are admitted, when known
    pub retry_after: Option<Duration>,
}

impl ErrorClassification for CircuitOpenError {
    fn is_retryable(&self) -> bool {
        true
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<CircuitOpenError> for CommonError {
    fn from(err: CircuitOpenError) -> Self {
        CommonError::circuit_open(err.dependency.as_str(), err.retry_after)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Outcomes in the window
    pub window_total: usize,
    /// Failures and timeouts in the window
    pub window_failures: usize,
    /// Failure percentage over the window
    pub failure_rate: f64,
    /// Calls refused since creation
    pub rejected_calls: u64,
    /// State transitions since creation
    pub transitions: u64,
    pub opened_at: Option<Instant>,
    /// Trial slots taken in the current HALF_OPEN period
    pub half_open_admitted: u32,
    pub generation: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failure_rate: f64,
    window_total: usize,
}

impl BreakerState {
    fn new(window_size: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            window: SlidingWindow::new(window_size),
            opened_at: None,
            half_open_admitted: 0,
            half_open_successes: 0,
            generation: 0,
        }
    }

    fn transition_to(&mut self, to: CircuitState, now: Instant) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
            failure_rate: self.window.failure_rate(),
            window_total: self.window.total(),
        };

        self.state = to;
        self.generation += 1;
        self.half_open_admitted = 0;
        self.half_open_successes = 0;

        match to {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::Closed => {
                self.opened_at = None;
                self.window.clear();
            }
            CircuitState::HalfOpen => {}
        }

        transition
    }

    fn apply(
        &mut self,
        outcome: CallOutcome,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.window.push(outcome);
                let enough_calls = self.window.total() >= config.minimum_calls as usize;
                if enough_calls && self.window.failure_rate() >= config.failure_rate_threshold {
                    Some(self.transition_to(CircuitState::Open, now))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if outcome.is_failure() {
                    return Some(self.transition_to(CircuitState::Open, now));
                }
                self.half_open_successes += 1;
                if self.half_open_successes >= config.half_open_permitted_calls {
                    Some(self.transition_to(CircuitState::Closed, now))
                } else {
                    None
                }
            }
            CircuitState::Open => {
                debug!(%outcome, "outcome ignored while circuit is open");
                None
            }
        }
    }
}

struct Shared<C> {
    dependency: DependencyName,
    config: CircuitBreakerConfig,
    clock: C,
    events: Arc<dyn EventSink>,
    state: Mutex<BreakerState>,
    rejected: AtomicU64,
    transitions: AtomicU64,
}

/// Per-dependency circuit breaker
///
/// Cloning yields another handle to the same breaker. Time is read through
/// the [`Clock`] so tests can drive state changes with a
/// [`MockClock`](callguard_common::time::MockClock).
///
/// # Examples
///
/// ```rust
/// use callguard_core::resilience::{
///     CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState, DependencyName,
/// };
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CircuitBreakerConfig::builder()
///     .minimum_calls(2)
///     .sliding_window_size(4)
///     .failure_rate_threshold(50.0)
///     .build()?;
/// let breaker = CircuitBreaker::new(DependencyName::from("payments"), config)?;
///
/// let mut permit = breaker.try_acquire()?;
/// permit.record(CallOutcome::Failure);
/// breaker.record_outcome(CallOutcome::Timeout);
///
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(breaker.try_acquire().is_err());
/// # Ok(())
/// # }
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.shared.dependency)
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock
    pub fn new(dependency: DependencyName, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(dependency, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        dependency: DependencyName,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        Self::with_parts(dependency, config, clock, Arc::new(NoOpEventSink))
    }

    /// Create a breaker with a custom clock and event sink
    pub fn with_parts(
        dependency: DependencyName,
        config: CircuitBreakerConfig,
        clock: C,
        events: Arc<dyn EventSink>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(dependency, config, clock, events))
    }

    pub(crate) fn from_validated(
        dependency: DependencyName,
        config: CircuitBreakerConfig,
        clock: C,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let window_size = usize::try_from(config.sliding_window_size).unwrap_or(usize::MAX);
        Self {
            shared: Arc::new(Shared {
                dependency,
                config,
                clock,
                events,
                state: Mutex::new(BreakerState::new(window_size)),
                rejected: AtomicU64::new(0),
                transitions: AtomicU64::new(0),
            }),
        }
    }

    /// Ask to run one call
    ///
    /// CLOSED always admits. OPEN rejects until `open_state_duration` has
    /// elapsed; the first request after that moves the breaker to HALF_OPEN
    /// and becomes its first trial. HALF_OPEN admits at most
    /// `half_open_permitted_calls` trials.
    pub fn try_acquire(&self) -> Result<BreakerPermit<C>, CircuitOpenError> {
        let config = &self.shared.config;
        let now = self.shared.clock.now();
        let mut transition = None;

        let decision = {
            let mut st = self.shared.state.lock();

            if st.state == CircuitState::Open {
                let opened_at = st.opened_at.unwrap_or(now);
                if now.saturating_duration_since(opened_at) >= config.open_state_duration {
                    transition = Some(st.transition_to(CircuitState::HalfOpen, now));
                }
            }

            match st.state {
                CircuitState::Closed => Ok((st.generation, false)),
                CircuitState::HalfOpen if st.half_open_admitted < config.half_open_permitted_calls => {
                    st.half_open_admitted += 1;
                    Ok((st.generation, true))
                }
                CircuitState::HalfOpen => Err(None),
                CircuitState::Open => {
                    let elapsed = st.opened_at.map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
                    Err(Some(config.open_state_duration.saturating_sub(elapsed)))
                }
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }

        match decision {
            Ok((generation, trial)) => {
                Ok(BreakerPermit { breaker: self.clone(), generation, trial, recorded: false })
            }
            Err(retry_after) => Err(self.reject(retry_after)),
        }
    }

    /// Record an outcome against the current state
    ///
    /// Timeouts count as failures. Outcomes arriving while OPEN are ignored.
    pub fn record_outcome(&self, outcome: CallOutcome) {
        let now = self.shared.clock.now();
        let transition = self.shared.state.lock().apply(outcome, &self.shared.config, now);
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn record_for_generation(&self, generation: u64, outcome: CallOutcome) {
        let now = self.shared.clock.now();
        let transition = {
            let mut st = self.shared.state.lock();
            if st.generation != generation {
                debug!(
                    dependency = %self.shared.dependency,
                    %outcome,
                    permit_generation = generation,
                    current_generation = st.generation,
                    "stale outcome dropped"
                );
                return;
            }
            st.apply(outcome, &self.shared.config, now)
        };
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn return_trial_slot(&self, generation: u64) {
        let mut st = self.shared.state.lock();
        if st.generation == generation && st.state == CircuitState::HalfOpen {
            st.half_open_admitted = st.half_open_admitted.saturating_sub(1);
            debug!(dependency = %self.shared.dependency, "unused trial slot returned");
        }
    }

    fn reject(&self, retry_after: Option<Duration>) -> CircuitOpenError {
        self.shared.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(dependency = %self.shared.dependency, ?retry_after, "circuit breaker rejecting call");
        self.shared
            .events
            .emit(ResilienceEvent::new(&self.shared.dependency, ResilienceEventKind::CircuitRejected));
        CircuitOpenError { dependency: self.shared.dependency.clone(), retry_after }
    }

    fn announce(&self, transition: Transition) {
        self.shared.transitions.fetch_add(1, Ordering::Relaxed);
        let dependency = &self.shared.dependency;
        let kind = match transition.to {
            CircuitState::Open => {
                warn!(
                    %dependency,
                    from = %transition.from,
                    failure_rate = transition.failure_rate,
                    window_total = transition.window_total,
                    "circuit opened"
                );
                ResilienceEventKind::CircuitOpened
            }
            CircuitState::HalfOpen => {
                info!(%dependency, from = %transition.from, "circuit half-open, admitting trial calls");
                ResilienceEventKind::CircuitHalfOpened
            }
            CircuitState::Closed => {
                info!(%dependency, from = %transition.from, "circuit closed");
                ResilienceEventKind::CircuitClosed
            }
        };
        self.shared.events.emit(ResilienceEvent::new(dependency, kind));
    }

    /// Current state
    ///
    /// Does not perform the OPEN to HALF_OPEN transition; only
    /// [`try_acquire`](Self::try_acquire) does.
    pub fn state(&self) -> CircuitState {
        self.shared.state.lock().state
    }

    /// Breaker owner
    pub fn dependency(&self) -> &DependencyName {
        &self.shared.dependency
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let st = self.shared.state.lock();
        CircuitBreakerMetrics {
            state: st.state,
            window_total: st.window.total(),
            window_failures: st.window.failures(),
            failure_rate: st.window.failure_rate(),
            rejected_calls: self.shared.rejected.load(Ordering::Acquire),
            transitions: self.shared.transitions.load(Ordering::Acquire),
            opened_at: st.opened_at,
            half_open_admitted: st.half_open_admitted,
            generation: st.generation,
        }
    }

    /// Force the breaker back to CLOSED with an empty window
    ///
    /// Outstanding permits become stale.
    pub fn reset(&self) {
        let now = self.shared.clock.now();
        let transition = {
            let mut st = self.shared.state.lock();
            if st.state == CircuitState::Closed {
                st.window.clear();
                st.generation += 1;
                None
            } else {
                Some(st.transition_to(CircuitState::Closed, now))
            }
        };
        if let Some(transition) = transition {
            self.announce(transition);
        }
        info!(dependency = %self.shared.dependency, "circuit breaker manually reset");
    }
}

/// Admission to run one call through a [`CircuitBreaker`]
///
/// Outcomes are recorded against the generation the permit was issued
/// under. Dropping a HALF_OPEN trial permit that never recorded an outcome
/// gives its trial slot back.
#[must_use = "record the call outcome on the permit"]
pub struct BreakerPermit<C: Clock = SystemClock> {
    breaker: CircuitBreaker<C>,
    generation: u64,
    trial: bool,
    recorded: bool,
}

impl<C: Clock> BreakerPermit<C> {
    /// Record one attempt's outcome
    pub fn record(&mut self, outcome: CallOutcome) {
        self.recorded = true;
        self.breaker.record_for_generation(self.generation, outcome);
    }

    /// Whether this permit is a HALF_OPEN trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Breaker generation the permit belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<C: Clock> fmt::Debug for BreakerPermit<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("dependency", self.breaker.dependency())
            .field("generation", &self.generation)
            .field("trial", &self.trial)
            .field("recorded", &self.recorded)
            .finish()
    }
}

impl<C: Clock> Drop for BreakerPermit<C> {
    fn drop(&mut self) {
        if self.trial && !self.recorded {
            self.breaker.return_trial_slot(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the circuit breaker
    //!
    //! Tests cover configuration validation, the opening condition, the
    //! HALF_OPEN trial protocol, permit generations and emitted events.

    use callguard_common::testing::RecordingEventSink;
    use callguard_common::time::MockClock;

    use super::*;

    fn config(min: u32, window: u32, threshold: f64, trials: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .minimum_calls(min)
            .sliding_window_size(window)
            .failure_rate_threshold(threshold)
            .open_state_duration(Duration::from_secs(30))
            .half_open_permitted_calls(trials)
            .build()
            .unwrap()
    }

    fn breaker(
        config: CircuitBreakerConfig,
    ) -> (CircuitBreaker<MockClock>, MockClock, RecordingEventSink) {
        let clock = MockClock::new();
        let sink = RecordingEventSink::new();
        let breaker = CircuitBreaker::with_parts(
            DependencyName::from("svc"),
            config,
            clock.clone(),
            Arc::new(sink.clone()),
        )
        .unwrap();
        (breaker, clock, sink)
    }

    fn trip(breaker: &CircuitBreaker<MockClock>) {
        let min = breaker.config().minimum_calls;
        for _ in 0..min {
            breaker.record_outcome(CallOutcome::Failure);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    #[test]
    fn test_default_config_is_valid() {
        let config = CircuitBreakerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimum_calls, 10);
        assert_eq!(config.sliding_window_size, 100);
        assert_eq!(config.open_state_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_config_validation() {
        let builder = || CircuitBreakerConfig::builder();
        assert!(builder().failure_rate_threshold(0.0).build().is_err());
        assert!(builder().failure_rate_threshold(100.5).build().is_err());
        assert!(builder().failure_rate_threshold(f64::NAN).build().is_err());
        assert!(builder().failure_rate_threshold(100.0).build().is_ok());
        assert!(builder().minimum_calls(0).build().is_err());
        assert!(builder().sliding_window_size(0).build().is_err());
        assert!(builder().minimum_calls(20).sliding_window_size(10).build().is_err());
        assert!(builder().half_open_permitted_calls(0).build().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    // =========================================================================
    // Opening condition
    // =========================================================================

    /// Validates that the breaker never opens before `minimum_calls`.
    ///
    /// Assertions:
    /// - Nine straight failures keep the circuit CLOSED.
    /// - The tenth opens it.
    #[test]
    fn test_does_not_open_below_minimum_calls() {
        let (breaker, _, _) = breaker(config(10, 100, 50.0, 3));

        for _ in 0..9 {
            breaker.record_outcome(CallOutcome::Failure);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_outcome(CallOutcome::Failure);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_opens_on_tenth_outcome_with_six_failures() {
        let (breaker, _, sink) = breaker(config(10, 100, 50.0, 3));
        let outcomes = [
            CallOutcome::Success,
            CallOutcome::Failure,
            CallOutcome::Success,
            CallOutcome::Failure,
            CallOutcome::Timeout,
            CallOutcome::Success,
            CallOutcome::Failure,
            CallOutcome::Success,
            CallOutcome::Failure,
        ];
        for outcome in outcomes {
            breaker.record_outcome(outcome);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_outcome(CallOutcome::Failure);

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(sink.kinds(), vec![ResilienceEventKind::CircuitOpened]);
        let err = breaker.try_acquire().unwrap_err();
        assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let (breaker, _, _) = breaker(config(10, 10, 50.0, 3));
        for i in 0..100 {
            let outcome = if i % 3 == 0 { CallOutcome::Failure } else { CallOutcome::Success };
            breaker.record_outcome(outcome);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().window_total, 10);
    }

    #[test]
    fn test_outcomes_ignored_while_open() {
        let (breaker, _, _) = breaker(config(2, 4, 50.0, 1));
        trip(&breaker);
        let before = breaker.metrics();

        breaker.record_outcome(CallOutcome::Success);
        breaker.record_outcome(CallOutcome::Failure);

        let after = breaker.metrics();
        assert_eq!(after.state, CircuitState::Open);
        assert_eq!(after.window_total, before.window_total);
        assert_eq!(after.generation, before.generation);
    }

    // =========================================================================
    // HALF_OPEN protocol
    // =========================================================================

    #[test]
    fn test_rejects_until_open_duration_elapses() {
        let (breaker, clock, _) = breaker(config(2, 4, 50.0, 1));
        trip(&breaker);

        clock.advance(Duration::from_secs(10));
        let err = breaker.try_acquire().unwrap_err();
        assert_eq!(err.retry_after, Some(Duration::from_secs(20)));

        clock.advance(Duration::from_secs(20));
        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    /// Validates the HALF_OPEN trial limit.
    ///
    /// Assertions:
    /// - `half_open_permitted_calls` trials are admitted.
    /// - The next concurrent request is rejected.
    #[test]
    fn test_half_open_admits_only_permitted_trials() {
        let (breaker, clock, _) = breaker(config(2, 4, 50.0, 2));
        trip(&breaker);
        clock.advance(Duration::from_secs(30));

        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();
        let third = breaker.try_acquire();

        assert!(first.is_trial() && second.is_trial());
        assert!(matches!(third, Err(CircuitOpenError { retry_after: None, .. })));
        assert_eq!(breaker.metrics().half_open_admitted, 2);
    }

    #[test]
    fn test_trial_failure_reopens_with_fresh_timer() {
        let (breaker, clock, sink) = breaker(config(2, 4, 50.0, 1));
        trip(&breaker);
        let first_opened_at = breaker.metrics().opened_at.unwrap();

        clock.advance(Duration::from_secs(31));
        let mut trial = breaker.try_acquire().unwrap();
        trial.record(CallOutcome::Timeout);

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Open);
        assert_eq!(metrics.opened_at.unwrap().duration_since(first_opened_at), Duration::from_secs(31));
        assert_eq!(
            sink.kinds(),
            vec![
                ResilienceEventKind::CircuitOpened,
                ResilienceEventKind::CircuitHalfOpened,
                ResilienceEventKind::CircuitOpened,
            ]
        );

        clock.advance(Duration::from_secs(29));
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn test_trial_successes_close_and_clear_window() {
        let (breaker, clock, sink) = breaker(config(2, 4, 50.0, 2));
        trip(&breaker);
        clock.advance(Duration::from_secs(30));

        let mut a = breaker.try_acquire().unwrap();
        let mut b = breaker.try_acquire().unwrap();
        a.record(CallOutcome::Success);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        b.record(CallOutcome::Success);

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.window_total, 0);
        assert_eq!(metrics.opened_at, None);
        assert_eq!(sink.count(ResilienceEventKind::CircuitClosed), 1);
    }

    #[test]
    fn test_dropped_trial_returns_slot() {
        let (breaker, clock, _) = breaker(config(2, 4, 50.0, 1));
        trip(&breaker);
        clock.advance(Duration::from_secs(30));

        let trial = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_err());

        drop(trial);

        assert_eq!(breaker.metrics().half_open_admitted, 0);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_recorded_trial_keeps_slot_on_drop() {
        let (breaker, clock, _) = breaker(config(2, 4, 50.0, 2));
        trip(&breaker);
        clock.advance(Duration::from_secs(30));

        let mut trial = breaker.try_acquire().unwrap();
        trial.record(CallOutcome::Success);
        drop(trial);

        assert_eq!(breaker.metrics().half_open_admitted, 1);
    }

    // =========================================================================
    // Generations
    // =========================================================================

    /// Validates that permits from an earlier state cannot affect the current one.
    ///
    /// Assertions:
    /// - A CLOSED-era failure recorded during HALF_OPEN does not reopen.
    #[test]
    fn test_stale_permit_outcome_is_dropped() {
        let (breaker, clock, _) = breaker(config(2, 4, 50.0, 1));
        let mut slow_call = breaker.try_acquire().unwrap();
        trip(&breaker);
        clock.advance(Duration::from_secs(30));
        let _trial = breaker.try_acquire().unwrap();

        slow_call.record(CallOutcome::Failure);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_reset_closes_and_invalidates_permits() {
        let (breaker, _, sink) = breaker(config(2, 4, 50.0, 1));
        let mut old = breaker.try_acquire().unwrap();
        trip(&breaker);

        breaker.reset();
        old.record(CallOutcome::Failure);
        old.record(CallOutcome::Failure);

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.window_total, 0);
        assert_eq!(sink.count(ResilienceEventKind::CircuitClosed), 1);
    }

    #[test]
    fn test_rejections_are_counted_and_emitted() {
        let (breaker, _, sink) = breaker(config(2, 4, 50.0, 1));
        trip(&breaker);

        for _ in 0..3 {
            assert!(breaker.try_acquire().is_err());
        }

        assert_eq!(breaker.metrics().rejected_calls, 3);
        assert_eq!(sink.count(ResilienceEventKind::CircuitRejected), 3);
    }

    #[test]
    fn test_concurrent_recording_keeps_window_consistent() {
        let (breaker, _, _) = breaker(config(50, 64, 100.0, 1));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let breaker = breaker.clone();
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        breaker.record_outcome(CallOutcome::Success);
                    }
                });
            }
        });

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.window_total, 64);
        assert_eq!(metrics.window_failures, 0);
    }

    #[test]
    fn test_circuit_open_error_converts_to_common() {
        let err = CircuitOpenError {
            dependency: DependencyName::from("svc"),
            retry_after: Some(Duration::from_secs(5)),
        };
        let common: CommonError = err.into();
        assert_eq!(common.retry_after(), Some(Duration::from_secs(5)));
    }
}
