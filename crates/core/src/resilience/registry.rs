//! Per-dependency state container
//!
//! The registry owns exactly one [`ConcurrencyGate`] and one
//! [`CircuitBreaker`] per dependency name. Entries are created on first use
//! from the [`ResilienceConfig`] it was built with: an override when one
//! exists for the name, the defaults otherwise. Entries live as long as the
//! registry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use callguard_common::observability::{EventSink, NoOpEventSink};
use callguard_common::time::{Clock, SystemClock};
use dashmap::DashMap;
use tracing::info;

use crate::config::{ConfigResult, DependencySettings, ResilienceConfig};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::resilience::dependency::DependencyName;
use crate::resilience::gate::{ConcurrencyGate, GateMetrics};
use crate::resilience::retry::RetryPolicy;

/// Gate, breaker and settings for one dependency
pub struct DependencyHandle<C: Clock = SystemClock> {
    name: DependencyName,
    settings: DependencySettings,
    gate: ConcurrencyGate,
    breaker: CircuitBreaker<C>,
}

impl<C: Clock> DependencyHandle<C> {
    pub fn name(&self) -> &DependencyName {
        &self.name
    }

    pub fn settings(&self) -> &DependencySettings {
        &self.settings
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Configured wait for a gate permit
    pub fn gate_timeout(&self) -> Duration {
        self.settings.gate_timeout
    }

    /// Retry policy from the configured settings with the default predicate
    pub fn retry_policy<E>(&self) -> RetryPolicy<E> {
        RetryPolicy::from_validated(self.settings.retry)
    }

    pub fn snapshot(&self) -> DependencySnapshot {
        DependencySnapshot {
            name: self.name.clone(),
            circuit: self.breaker.metrics(),
            gate: self.gate.metrics(),
        }
    }
}

impl<C: Clock> fmt::Debug for DependencyHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyHandle")
            .field("name", &self.name)
            .field("gate", &self.gate)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// Point-in-time view of one dependency
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySnapshot {
    pub name: DependencyName,
    pub circuit: CircuitBreakerMetrics,
    pub gate: GateMetrics,
}

/// Registry of dependency handles keyed by name
///
/// # Examples
///
/// ```rust
/// use callguard_core::config::{DependencySettings, ResilienceConfig};
/// use callguard_core::resilience::{DependencyName, DependencyRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ResilienceConfig::default()
///     .with_dependency("payments", DependencySettings::default().with_max_permits(4));
/// let registry = DependencyRegistry::new(config)?;
///
/// let payments = registry.handle(&DependencyName::from("payments"));
/// assert_eq!(payments.gate().max_permits(), 4);
/// # Ok(())
/// # }
/// ```
pub struct DependencyRegistry<C: Clock + Clone = SystemClock> {
    config: ResilienceConfig,
    clock: C,
    events: Arc<dyn EventSink>,
    entries: DashMap<DependencyName, Arc<DependencyHandle<C>>>,
}

impl DependencyRegistry<SystemClock> {
    /// Create a registry on the system clock
    pub fn new(config: ResilienceConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> DependencyRegistry<C> {
    /// Create a registry whose breakers read time from `clock`
    pub fn with_clock(config: ResilienceConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, events: Arc::new(NoOpEventSink), entries: DashMap::new() })
    }

    /// Report gate and breaker events to `events`
    ///
    /// Applies to handles created afterwards.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Handle for `name`, created on first use
    ///
    /// Concurrent first calls for the same name observe the same handle.
    pub fn handle(&self, name: &DependencyName) -> Arc<DependencyHandle<C>> {
        if let Some(existing) = self.entries.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self.entries.entry(name.clone()).or_insert_with(|| Arc::new(self.create(name)));
        Arc::clone(entry.value())
    }

    fn create(&self, name: &DependencyName) -> DependencyHandle<C> {
        let settings = *self.config.for_dependency(name.as_str());
        info!(
            dependency = %name,
            max_permits = settings.max_permits,
            failure_rate_threshold = settings.circuit_breaker.failure_rate_threshold,
            "registering dependency"
        );

        DependencyHandle {
            name: name.clone(),
            settings,
            gate: ConcurrencyGate::from_validated(
                name.clone(),
                settings.max_permits,
                Arc::clone(&self.events),
            ),
            breaker: CircuitBreaker::from_validated(
                name.clone(),
                settings.circuit_breaker,
                self.clock.clone(),
                Arc::clone(&self.events),
            ),
        }
    }

    /// Existing handle for `name`, without creating one
    pub fn get(&self, name: &str) -> Option<Arc<DependencyHandle<C>>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names with a handle, sorted
    pub fn dependencies(&self) -> Vec<DependencyName> {
        let mut names: Vec<_> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every registered dependency, sorted by name
    pub fn snapshot(&self) -> Vec<DependencySnapshot> {
        let mut snapshots: Vec<_> = self.entries.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Force the breaker for `name` back to CLOSED
    ///
    /// Returns `false` when the dependency has no handle yet.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(handle) => {
                handle.breaker().reset();
                true
            }
            None => false,
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Clock + Clone> fmt::Debug for DependencyRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyRegistry")
            .field("dependencies", &self.dependencies())
            .finish_non_exhaustive()
    }
}
