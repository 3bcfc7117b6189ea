//! Sink traits that decouple the call runtime from log and metric pipelines
//!
//! The runtime only knows about [`EventSink`] and [`MetricsCollector`];
//! concrete exporters live outside this workspace.

use std::fmt::Debug;
use std::sync::Arc;

use super::events::ResilienceEvent;

// ============================================================================
// Event Sink
// ============================================================================

/// Receiver for [`ResilienceEvent`]s
///
/// `emit` is called inline on the call path, after any internal lock has
/// been released. Implementations must not block.
pub trait EventSink: Send + Sync + Debug {
    /// Publish one event
    fn emit(&self, event: ResilienceEvent);

    /// Whether events are consumed at all
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: ResilienceEvent) {
        (**self).emit(event);
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: ResilienceEvent) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

// ============================================================================
// Metrics Collection
// ============================================================================

/// Metrics backend abstraction
///
/// Allows components to emit metrics without depending on a specific
/// metrics collection system.
pub trait MetricsCollector: Send + Sync + Debug {
    /// Record a counter metric
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]);

    /// Record a gauge metric
    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record a histogram metric
    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record timing metric (in milliseconds)
    #[allow(clippy::cast_precision_loss)]
    fn record_timing(&self, name: &str, duration_ms: u64, labels: &[(&str, &str)]) {
        self.record_histogram(name, duration_ms as f64, labels);
    }
}

impl<T: MetricsCollector + ?Sized> MetricsCollector for Arc<T> {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        (**self).increment_counter(name, labels);
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        (**self).record_gauge(name, value, labels);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        (**self).record_histogram(name, value, labels);
    }

    fn record_timing(&self, name: &str, duration_ms: u64, labels: &[(&str, &str)]) {
        (**self).record_timing(name, duration_ms, labels);
    }
}

/// Collector that drops every metric
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn increment_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}

    fn record_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}

    fn record_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}
