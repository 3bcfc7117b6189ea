//! Retry executor
//!
//! Re-invokes one async operation under a [`RetryPolicy`]. Attempts are
//! strictly sequential: attempt `n + 1` starts only after attempt `n` has
//! finished, been handed to the observer and its backoff has elapsed.
//!
//! Dropping the future returned by any `execute*` method cancels the pending
//! backoff sleep or the in-flight attempt, and no further attempt is started.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use callguard_core::resilience::{AttemptError, RetryExecutor, RetryPolicy};
//!
//! # async fn fetch() -> Result<u32, AttemptError<String>> { Ok(1) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::<String>::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .attempt_timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! let value = RetryExecutor::new().execute(fetch, &policy).await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, ConfigResult};
use crate::resilience::backoff::{Backoff, Jitter};
use crate::resilience::outcome::{AttemptError, AttemptRecord, CallOutcome};

/// Predicate deciding whether a failed attempt may be retried
pub type RetryPredicate<E> = Arc<dyn Fn(&AttemptError<E>) -> bool + Send + Sync>;

/// Serializable part of a retry policy
///
/// Durations are expressed in milliseconds in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt, before jitter
    #[serde(rename = "base_delay_ms", with = "callguard_common::duration_millis")]
    pub base_delay: Duration,

    /// Upper bound on the pre-jitter delay
    #[serde(rename = "max_delay_ms", with = "callguard_common::duration_millis")]
    pub max_delay: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Randomization applied to each delay
    pub jitter: Jitter,

    /// Deadline for a single attempt
    #[serde(
        rename = "attempt_timeout_ms",
        with = "callguard_common::option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            max_attempts: 3,
            base_delay: backoff.base_delay,
            max_delay: backoff.max_delay,
            multiplier: backoff.multiplier,
            jitter: backoff.jitter,
            attempt_timeout: None,
        }
    }
}

impl RetrySettings {
    /// Delay schedule described by these settings
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }

        if self.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::invalid("attempt_timeout", "must be greater than zero"));
        }

        self.backoff().validate()
    }
}

/// How a dependency call is retried
///
/// Immutable once built. Cloning is cheap: a custom predicate sits behind an
/// `Arc`, so one policy can be shared by any number of concurrent calls.
/// Without a custom predicate, [`AttemptError::is_transient`] decides.
pub struct RetryPolicy<E> {
    settings: RetrySettings,
    retryable: Option<RetryPredicate<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self { settings: self.settings, retryable: self.retryable.clone() }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("settings", &self.settings)
            .field("retryable", &if self.retryable.is_some() { "custom" } else { "default" })
            .finish()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::from_validated(RetrySettings::default())
    }
}

impl<E> RetryPolicy<E> {
    /// Create a new policy with validation
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Create a policy builder (alias for `new()`)
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Build a policy with the default predicate from settings
    pub fn from_settings(settings: RetrySettings) -> ConfigResult<Self> {
        settings.validate()?;
        Ok(Self::from_validated(settings))
    }

    pub(crate) fn from_validated(settings: RetrySettings) -> Self {
        Self { settings, retryable: None }
    }

    /// Replace the retryable predicate
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AttemptError<E>) -> bool + Send + Sync + 'static,
    {
        self.retryable = Some(Arc::new(predicate));
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Delay schedule
    pub fn backoff(&self) -> Backoff {
        self.settings.backoff()
    }

    /// Per-attempt deadline
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.settings.attempt_timeout
    }

    /// Underlying settings
    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Whether `error` may be retried under this policy
    pub fn is_retryable(&self, error: &AttemptError<E>) -> bool {
        match &self.retryable {
            Some(predicate) => predicate(error),
            None => error.is_transient(),
        }
    }
}

/// Builder for [`RetryPolicy`]
pub struct RetryPolicyBuilder<E> {
    settings: RetrySettings,
    retryable: Option<RetryPredicate<E>>,
}

impl<E> fmt::Debug for RetryPolicyBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyBuilder").field("settings", &self.settings).finish()
    }
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        Self { settings: RetrySettings::default(), retryable: None }
    }

    /// Start from existing settings
    pub fn settings(mut self, settings: RetrySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.settings.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.settings.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.settings.multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.settings.jitter = jitter;
        self
    }

    /// Disable jitter (deterministic delays)
    pub fn no_jitter(self) -> Self {
        self.jitter(Jitter::None)
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.settings.attempt_timeout = Some(timeout);
        self
    }

    /// Custom retryable predicate
    ///
    /// The default retries timeouts and failures flagged `retryable`.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AttemptError<E>) -> bool + Send + Sync + 'static,
    {
        self.retryable = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> ConfigResult<RetryPolicy<E>> {
        self.settings.validate()?;
        Ok(RetryPolicy {
            settings: self.settings,
            retryable: self.retryable,
        })
    }
}

/// Why the executor gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: AttemptError<E>,
    },

    /// An attempt failed with an error the policy does not retry
    #[error("non-retryable failure on attempt {attempt}: {cause}")]
    NonRetryable {
        /// Attempt that failed
        attempt: u32,
        /// Its error
        cause: AttemptError<E>,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::NonRetryable { attempt, .. } => *attempt,
        }
    }

    /// Error of the last attempt
    pub fn last_error(&self) -> &AttemptError<E> {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::NonRetryable { cause, .. } => cause,
        }
    }

    /// Consume into the error of the last attempt
    pub fn into_last_error(self) -> AttemptError<E> {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::NonRetryable { cause, .. } => cause,
        }
    }
}

/// Result of [`RetryExecutor::execute_with_outcome`] with bookkeeping
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result
    pub result: Result<T, RetryError<E>>,
    /// Attempts made
    pub attempts: u32,
    /// Sum of backoff delays waited
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs operations under a [`RetryPolicy`]
///
/// Stateless. Log lines inherit the caller's span, so a dependency name
/// recorded there is not repeated on the `retry` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    pub const fn new() -> Self {
        Self
    }

    /// Execute an operation with retry logic
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy<E>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        self.execute_with_outcome(operation, policy).await.into_result()
    }

    /// Execute an operation and report attempt count and total delay
    pub async fn execute_with_outcome<T, E, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy<E>,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        self.execute_observed(operation, policy, |_| {}).await
    }

    /// Execute an operation, calling `observer` after every attempt
    ///
    /// The observer runs before any backoff wait, so attempt `n` is observed
    /// before attempt `n + 1` starts.
    #[instrument(
        name = "retry",
        skip_all,
        fields(max_attempts = policy.max_attempts())
    )]
    pub async fn execute_observed<T, E, F, Fut, O>(
        &self,
        mut operation: F,
        policy: &RetryPolicy<E>,
        mut observer: O,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        O: FnMut(&AttemptRecord),
    {
        let max_attempts = policy.max_attempts().max(1);
        let backoff = policy.backoff();
        let mut attempt: u32 = 1;
        let mut total_delay = Duration::ZERO;

        loop {
            debug!(attempt, max_attempts, "starting attempt");

            let started_at = tokio::time::Instant::now();
            let result = match policy.attempt_timeout() {
                Some(limit) => tokio::time::timeout(limit, operation())
                    .await
                    .unwrap_or(Err(AttemptError::Timeout { limit })),
                None => operation().await,
            };

            let record = AttemptRecord {
                attempt,
                started_at: started_at.into_std(),
                elapsed: started_at.elapsed(),
                outcome: result.as_ref().map_or_else(AttemptError::outcome, |_| CallOutcome::Success),
            };
            observer(&record);

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, total_delay };
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!(attempt, outcome = %record.outcome, "all retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::Exhausted { attempts: attempt, last: error }),
                    attempts: attempt,
                    total_delay,
                };
            }

            if !policy.is_retryable(&error) {
                debug!(attempt, outcome = %record.outcome, "failure is not retryable");
                return RetryOutcome {
                    result: Err(RetryError::NonRetryable { attempt, cause: error }),
                    attempts: attempt,
                    total_delay,
                };
            }

            let delay = backoff.next_delay(attempt);
            warn!(
                attempt,
                outcome = %record.outcome,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            total_delay += delay;
            attempt += 1;
        }
    }
}
