//! Event sink adapters for `tracing` and metrics backends

use tracing::{info, warn};

use super::events::{ResilienceEvent, ResilienceEventKind};
use super::traits::{EventSink, MetricsCollector};

/// Writes each event as a structured `tracing` event
///
/// Circuit openings and rejections are logged at `warn`, everything else at
/// `info`. Attempt events are usually high volume; filter the
/// `callguard::events` target to silence them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ResilienceEvent) {
        let dependency = &*event.dependency;
        let kind = event.kind.as_str();
        let attempt = event.attempt.unwrap_or(0);

        match event.kind {
            ResilienceEventKind::CircuitOpened
            | ResilienceEventKind::GateRejected
            | ResilienceEventKind::CircuitRejected => {
                warn!(target: "callguard::events", dependency, kind, attempt, "resilience event");
            }
            _ => {
                info!(target: "callguard::events", dependency, kind, attempt, "resilience event");
            }
        }
    }
}

/// Counts events through a [`MetricsCollector`]
///
/// Each event increments `{prefix}.{kind}` labelled with `dependency`.
#[derive(Debug, Clone)]
pub struct MetricsEventSink<M: MetricsCollector> {
    collector: M,
    prefix: String,
}

impl<M: MetricsCollector> MetricsEventSink<M> {
    /// Default metric name prefix
    pub const DEFAULT_PREFIX: &'static str = "callguard";

    /// Wrap a collector using the default prefix
    pub fn new(collector: M) -> Self {
        Self::with_prefix(collector, Self::DEFAULT_PREFIX)
    }

    /// Wrap a collector using a custom metric name prefix
    pub fn with_prefix(collector: M, prefix: impl Into<String>) -> Self {
        Self { collector, prefix: prefix.into() }
    }

    /// Metric name for an event kind
    pub fn metric_name(&self, kind: ResilienceEventKind) -> String {
        format!("{}.{}", self.prefix, kind.as_str())
    }

    /// Underlying collector
    pub fn collector(&self) -> &M {
        &self.collector
    }
}

impl<M: MetricsCollector> EventSink for MetricsEventSink<M> {
    fn emit(&self, event: ResilienceEvent) {
        let name = self.metric_name(event.kind);
        self.collector.increment_counter(&name, &[("dependency", &*event.dependency)]);
    }
}

/// Fans one event out to several sinks
#[derive(Debug, Default)]
pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl CompositeEventSink {
    /// Create an empty composite
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of wrapped sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are wrapped
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, event: ResilienceEvent) {
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        for sink in rest {
            sink.emit(event.clone());
        }
        last.emit(event);
    }

    fn is_enabled(&self) -> bool {
        self.sinks.iter().any(|s| s.is_enabled())
    }
}
