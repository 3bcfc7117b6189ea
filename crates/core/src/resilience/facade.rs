//! Resilient call facade
//!
//! [`ResilientCaller::call`] is the single entry point for protected calls.
//! For one call it:
//!
//! 1. waits up to `gate_timeout` for a permit from the dependency's gate,
//!    failing with [`ResilientCallError::GateExhausted`] without invoking
//!    the operation;
//! 2. asks the circuit breaker for admission, releasing the gate permit and
//!    failing with [`ResilientCallError::CircuitOpen`] when refused;
//! 3. runs the operation under the retry policy, recording every attempt's
//!    outcome on the breaker as it completes;
//! 4. releases both permits exactly once, on every exit path including
//!    cancellation of the returned future.
//!
//! Breaker admission happens once per call. Retries of an admitted call are
//! not re-checked against the breaker; if the circuit opens mid-call, the
//! remaining attempts' outcomes are discarded as stale.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use callguard_common::observability::{ResilienceEvent, ResilienceEventKind};
use callguard_common::time::{Clock, SystemClock};
use callguard_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{ConfigResult, ResilienceConfig};
use crate::resilience::dependency::DependencyName;
use crate::resilience::outcome::{AttemptError, AttemptRecord};
use crate::resilience::registry::DependencyRegistry;
use crate::resilience::retry::{RetryError, RetryExecutor, RetryPolicy};

/// Why a protected call did not return a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilientCallError<E> {
    /// No gate permit within the wait budget; the operation never ran
    #[error("concurrency gate for '{dependency}' exhausted after {waited:?}")]
    GateExhausted {
        dependency: DependencyName,
        max_permits: usize,
        waited: Duration,
    },

    /// The circuit breaker refused the call; the operation never ran
    #[error("circuit open for '{dependency}'")]
    CircuitOpen {
        dependency: DependencyName,
        /// Time until trial calls are admitted, when known
        retry_after: Option<Duration>,
    },

    /// Every attempt allowed by the retry policy failed
    #[error("call to '{dependency}' failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        dependency: DependencyName,
        attempts: u32,
        last: AttemptError<E>,
    },

    /// An attempt failed with an error the retry policy does not retry
    #[error("call to '{dependency}' failed on attempt {attempt} without retry: {cause}")]
    NonRetryableFailure {
        dependency: DependencyName,
        attempt: u32,
        cause: AttemptError<E>,
    },
}

impl<E> ResilientCallError<E> {
    pub fn dependency(&self) -> &DependencyName {
        match self {
            Self::GateExhausted { dependency, .. }
            | Self::CircuitOpen { dependency, .. }
            | Self::RetriesExhausted { dependency, .. }
            | Self::NonRetryableFailure { dependency, .. } => dependency,
        }
    }

    /// Attempts made; zero when the call was rejected before running
    pub fn attempts(&self) -> u32 {
        match self {
            Self::GateExhausted { .. } | Self::CircuitOpen { .. } => 0,
            Self::RetriesExhausted { attempts, .. } => *attempts,
            Self::NonRetryableFailure { attempt, .. } => *attempt,
        }
    }

    /// Error of the final attempt, if the operation ran
    pub fn last_error(&self) -> Option<&AttemptError<E>> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::NonRetryableFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Whether the call was turned away before the operation was invoked
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::GateExhausted { .. } | Self::CircuitOpen { .. })
    }

    fn from_retry(dependency: &DependencyName, err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => {
                Self::RetriesExhausted { dependency: dependency.clone(), attempts, last }
            }
            RetryError::NonRetryable { attempt, cause } => {
                Self::NonRetryableFailure { dependency: dependency.clone(), attempt, cause }
            }
        }
    }
}

impl<E> ErrorClassification for ResilientCallError<E> {
    fn is_retryable(&self) -> bool {
        self.is_rejection()
    }

    fn severity(&self) -> ErrorSeverity {
        if self.is_rejection() {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> From<ResilientCallError<E>> for CommonError {
    fn from(err: ResilientCallError<E>) -> Self {
        match err {
            ResilientCallError::GateExhausted { dependency, max_permits, .. } => {
                CommonError::concurrency_limit(dependency.as_str(), max_permits)
            }
            ResilientCallError::CircuitOpen { dependency, retry_after } => {
                CommonError::circuit_open(dependency.as_str(), retry_after)
            }
            ResilientCallError::RetriesExhausted { dependency, last: AttemptError::Timeout { limit }, .. }
            | ResilientCallError::NonRetryableFailure {
                dependency,
                cause: AttemptError::Timeout { limit },
                ..
            } => CommonError::timeout(dependency.as_str(), limit),
            ResilientCallError::RetriesExhausted { dependency, last: AttemptError::Failure { cause, .. }, .. } => {
                CommonError::backend(dependency.as_str(), cause.to_string(), false)
            }
            ResilientCallError::NonRetryableFailure {
                dependency,
                cause: AttemptError::Failure { cause, .. },
                ..
            } => CommonError::backend(dependency.as_str(), cause.to_string(), false),
        }
    }
}

/// Runs operations against dependencies through gate, breaker and retries
///
/// Cloning shares the registry, so every clone sees the same per-dependency
/// state.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use callguard_core::config::ResilienceConfig;
/// use callguard_core::resilience::{AttemptError, DependencyName, ResilientCaller, RetryPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let caller = ResilientCaller::from_config(ResilienceConfig::default())?;
/// let policy = RetryPolicy::<String>::builder().max_attempts(2).build()?;
///
/// let body = caller
///     .call(
///         &DependencyName::from("inventory"),
///         || async { Ok::<_, AttemptError<String>>("in stock") },
///         &policy,
///         Duration::from_millis(100),
///     )
///     .await?;
/// assert_eq!(body, "in stock");
/// # Ok(())
/// # }
/// ```
pub struct ResilientCaller<C: Clock + Clone = SystemClock> {
    registry: Arc<DependencyRegistry<C>>,
}

impl<C: Clock + Clone> Clone for ResilientCaller<C> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry) }
    }
}

impl<C: Clock + Clone> std::fmt::Debug for ResilientCaller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCaller").field("registry", &self.registry).finish()
    }
}

impl ResilientCaller<SystemClock> {
    /// Build a caller with its own registry
    pub fn from_config(config: ResilienceConfig) -> ConfigResult<Self> {
        Ok(Self::new(Arc::new(DependencyRegistry::new(config)?)))
    }
}

impl<C: Clock + Clone> ResilientCaller<C> {
    pub fn new(registry: Arc<DependencyRegistry<C>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DependencyRegistry<C>> {
        &self.registry
    }

    /// Run `operation` against `dependency`
    ///
    /// `operation` is invoked once per attempt. Dropping the returned future
    /// cancels any backoff wait, releases the gate permit and returns an
    /// unused HALF_OPEN trial slot.
    #[instrument(name = "resilient_call", skip_all, fields(dependency = %dependency))]
    pub async fn call<T, E, F, Fut>(
        &self,
        dependency: &DependencyName,
        mut operation: F,
        policy: &RetryPolicy<E>,
        gate_timeout: Duration,
    ) -> Result<T, ResilientCallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        let handle = self.registry.handle(dependency);
        let events = self.registry.events();

        let gate_permit = handle.gate().acquire(gate_timeout).await.map_err(|rejected| {
            ResilientCallError::GateExhausted {
                dependency: rejected.dependency,
                max_permits: rejected.max_permits,
                waited: rejected.waited,
            }
        })?;

        let mut breaker_permit = match handle.breaker().try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                gate_permit.release();
                return Err(ResilientCallError::CircuitOpen {
                    dependency: open.dependency,
                    retry_after: open.retry_after,
                });
            }
        };
        if breaker_permit.is_trial() {
            debug!("call admitted as half-open trial");
        }

        let mut started = 0;
        let attempt = || {
            started += 1;
            events.emit(ResilienceEvent::attempt(dependency, ResilienceEventKind::AttemptStarted, started));
            operation()
        };
        let observe = |record: &AttemptRecord| {
            let kind = if record.outcome.is_failure() {
                ResilienceEventKind::AttemptFailed
            } else {
                ResilienceEventKind::AttemptSucceeded
            };
            events.emit(ResilienceEvent::attempt(dependency, kind, record.attempt));
            breaker_permit.record(record.outcome);
        };

        let outcome = RetryExecutor::new()
            .execute_observed(attempt, policy, observe)
            .await;

        drop(breaker_permit);
        gate_permit.release();

        debug!(attempts = outcome.attempts, success = outcome.is_success(), "call finished");
        outcome.result.map_err(|err| ResilientCallError::from_retry(dependency, err))
    }

    /// Run `operation` with the dependency's configured retry policy and gate timeout
    pub async fn call_with_defaults<T, E, F, Fut>(
        &self,
        dependency: &DependencyName,
        operation: F,
    ) -> Result<T, ResilientCallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        let handle = self.registry.handle(dependency);
        let policy = handle.retry_policy::<E>();
        self.call(dependency, operation, &policy, handle.gate_timeout()).await
    }
}
