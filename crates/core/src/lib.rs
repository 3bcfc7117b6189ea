//! # CallGuard Core
//!
//! Fault-tolerance runtime for calls to remote dependencies.
//!
//! This crate contains:
//! - A bounded concurrency gate per dependency
//! - A sliding-window circuit breaker per dependency
//! - A retry executor with capped exponential backoff and jitter
//! - [`ResilientCaller`], which composes the three for every call
//! - TOML configuration for all of the above
//!
//! ## Architecture Principles
//! - Only depends on `callguard-common` for errors, clock and events
//! - Per-dependency state lives in an injected [`DependencyRegistry`], never
//!   in a global
//! - Every wait is an async suspension on tokio; no worker thread blocks
//! - Permits are RAII guards released on every exit path, cancellation
//!   included

pub mod config;
pub mod resilience;

pub use config::{ConfigError, ConfigResult, DependencySettings, ResilienceConfig};
pub use resilience::{
    AttemptError, CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    ConcurrencyGate, DependencyName, DependencyRegistry, ResilientCallError, ResilientCaller,
    RetryExecutor, RetryPolicy, RetrySettings,
};
