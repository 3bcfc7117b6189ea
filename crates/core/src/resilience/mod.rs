//! Resilience primitives for outbound dependency calls
//!
//! - [`backoff`]: delay schedule between retry attempts
//! - [`retry`]: retry policy and executor
//! - [`circuit_breaker`]: sliding-window circuit breaker
//! - [`gate`]: bounded concurrency gate
//! - [`registry`]: per-dependency gate and breaker ownership
//! - [`facade`]: the [`ResilientCaller`] entry point composing all of the above

pub mod backoff;
pub mod circuit_breaker;
pub mod dependency;
pub mod facade;
pub mod gate;
pub mod outcome;
pub mod registry;
pub mod retry;
mod window;

pub use backoff::{capped_delay, next_delay, Backoff, Jitter};
pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitOpenError, CircuitState,
};
pub use dependency::DependencyName;
pub use facade::{ResilientCallError, ResilientCaller};
pub use gate::{ConcurrencyGate, GateExhausted, GateMetrics, GatePermit};
pub use outcome::{AttemptError, AttemptRecord, CallOutcome};
pub use registry::{DependencyHandle, DependencyRegistry, DependencySnapshot};
pub use retry::{
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryPolicyBuilder, RetryPredicate,
    RetrySettings,
};
