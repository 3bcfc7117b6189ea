//! Per-attempt results
//!
//! An operation wrapped by the runtime returns `Result<T, AttemptError<E>>`.
//! The operation decides whether its own failure is worth retrying;
//! the executor produces [`AttemptError::Timeout`] when an attempt exceeds
//! its deadline.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Kind of a single attempt observation, as stored in the breaker window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOutcome {
    /// The attempt returned a value
    Success,
    /// The attempt returned an error
    Failure,
    /// The attempt exceeded its deadline
    Timeout,
}

impl CallOutcome {
    /// Failures and timeouts both count against the failure rate
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Error side of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError<E> {
    /// The operation failed
    #[error("attempt failed: {cause}")]
    Failure {
        /// Whether the operation considers this failure transient
        retryable: bool,
        /// Operation-specific error
        cause: E,
    },

    /// The attempt did not finish within its deadline
    #[error("attempt timed out after {limit:?}")]
    Timeout {
        /// Deadline that elapsed
        limit: Duration,
    },
}

impl<E> AttemptError<E> {
    /// A failure worth retrying (connection reset, 503, ...)
    pub fn transient(cause: E) -> Self {
        Self::Failure { retryable: true, cause }
    }

    /// A failure that will not go away on retry (malformed request, 4xx, ...)
    pub fn permanent(cause: E) -> Self {
        Self::Failure { retryable: false, cause }
    }

    /// Observation recorded by the circuit breaker
    pub fn outcome(&self) -> CallOutcome {
        match self {
            Self::Failure { .. } => CallOutcome::Failure,
            Self::Timeout { .. } => CallOutcome::Timeout,
        }
    }

    /// Retryability the default policy predicate uses
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Failure { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
        }
    }

    /// Operation error, if this is not a timeout
    pub fn cause(&self) -> Option<&E> {
        match self {
            Self::Failure { cause, .. } => Some(cause),
            Self::Timeout { .. } => None,
        }
    }

    /// Consume into the operation error, if this is not a timeout
    pub fn into_cause(self) -> Option<E> {
        match self {
            Self::Failure { cause, .. } => Some(cause),
            Self::Timeout { .. } => None,
        }
    }

    /// Transform the operation error
    pub fn map<F, U>(self, f: F) -> AttemptError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Failure { retryable, cause } => AttemptError::Failure { retryable, cause: f(cause) },
            Self::Timeout { limit } => AttemptError::Timeout { limit },
        }
    }
}

/// Record of one attempt inside one call
///
/// Handed to the attempt observer right after the attempt finishes and
/// before any backoff wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// When the attempt started
    pub started_at: Instant,
    /// How long the attempt ran
    pub elapsed: Duration,
    /// What it produced
    pub outcome: CallOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient_failures() {
        let err: AttemptError<()> = AttemptError::Timeout { limit: Duration::from_millis(5) };
        assert!(err.is_transient());
        assert_eq!(err.outcome(), CallOutcome::Timeout);
        assert!(err.outcome().is_failure());
        assert_eq!(err.cause(), None);
    }

    #[test]
    fn constructors_set_retryable_flag() {
        assert!(AttemptError::transient("503").is_transient());
        assert!(!AttemptError::permanent("400").is_transient());
        assert_eq!(AttemptError::permanent("400").outcome(), CallOutcome::Failure);
    }

    #[test]
    fn map_preserves_shape() {
        let err = AttemptError::transient(404_u16).map(|code| format!("status {code}"));
        assert_eq!(err, AttemptError::transient("status 404".to_string()));
        assert_eq!(err.to_string(), "attempt failed: status 404");
        assert_eq!(err.into_cause().as_deref(), Some("status 404"));
    }

    #[test]
    fn success_is_not_a_failure() {
        assert!(!CallOutcome::Success.is_failure());
        assert_eq!(CallOutcome::Timeout.to_string(), "timeout");
    }
}
