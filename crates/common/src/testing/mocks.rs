//! Mock implementations of the observability traits and scripted operations
//!
//! Provides mock objects for testing purposes.

#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::observability::{EventSink, MetricsCollector, ResilienceEvent, ResilienceEventKind};

/// Event sink that keeps every event in memory
///
/// Clones share the same buffer, so one clone can be handed to the runtime
/// while the test inspects another.
///
/// # Examples
///
/// ```
/// use callguard_common::observability::{EventSink, ResilienceEvent, ResilienceEventKind};
/// use callguard_common::testing::RecordingEventSink;
///
/// let sink = RecordingEventSink::new();
/// sink.emit(ResilienceEvent::new("payments", ResilienceEventKind::CircuitOpened));
///
/// assert_eq!(sink.count(ResilienceEventKind::CircuitOpened), 1);
/// assert_eq!(sink.kinds_for("payments"), vec![ResilienceEventKind::CircuitOpened]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<ResilienceEvent>>>,
}

impl RecordingEventSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, in emission order
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.lock().clone()
    }

    /// Kinds in emission order
    pub fn kinds(&self) -> Vec<ResilienceEventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Kinds emitted for one dependency, in emission order
    pub fn kinds_for(&self, dependency: &str) -> Vec<ResilienceEventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| &*e.dependency == dependency)
            .map(|e| e.kind)
            .collect()
    }

    /// Number of events of `kind`
    pub fn count(&self, kind: ResilienceEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Total number of events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: ResilienceEvent) {
        self.events.lock().push(event);
    }
}

/// Metrics collector that keeps counters, gauges and histograms in memory
///
/// Metric keys are the metric name followed by sorted `key=value` labels,
/// e.g. `callguard.gate_rejected{dependency=payments}`.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricsCollector {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    gauges: Arc<Mutex<HashMap<String, f64>>>,
    histograms: Arc<Mutex<HashMap<String, Vec<f64>>>>,
}

impl RecordingMetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the storage key for a metric
    pub fn key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort_unstable();
        format!("{name}{{{}}}", pairs.join(","))
    }

    /// Counter value for a key built with [`Self::key`]
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    /// Last gauge value for a key
    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.gauges.lock().get(key).copied()
    }

    /// Histogram samples for a key
    pub fn histogram(&self, key: &str) -> Vec<f64> {
        self.histograms.lock().get(key).cloned().unwrap_or_default()
    }
}

impl MetricsCollector for RecordingMetricsCollector {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        *self.counters.lock().entry(Self::key(name, labels)).or_insert(0) += 1;
    }

    fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.gauges.lock().insert(Self::key(name, labels), value);
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.histograms.lock().entry(Self::key(name, labels)).or_default().push(value);
    }
}

/// Pre-programmed sequence of results for a fake remote call
///
/// Each invocation pops the next scripted result and counts the call. Once
/// the script is exhausted every further call returns the fallback, if one
/// was set.
///
/// # Examples
///
/// ```
/// use callguard_common::testing::ScriptedCalls;
///
/// let script = ScriptedCalls::new([Err("boom"), Ok(7)]);
/// assert_eq!(script.next_result(), Some(Err("boom")));
/// assert_eq!(script.next_result(), Some(Ok(7)));
/// assert_eq!(script.next_result(), None);
/// assert_eq!(script.calls(), 3);
/// ```
#[derive(Debug)]
pub struct ScriptedCalls<T, E> {
    script: Arc<Mutex<VecDeque<Result<T, E>>>>,
    fallback: Arc<Mutex<Option<Result<T, E>>>>,
    calls: Arc<AtomicU32>,
}

impl<T, E> Clone for ScriptedCalls<T, E> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            fallback: Arc::clone(&self.fallback),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T: Clone, E: Clone> ScriptedCalls<T, E> {
    /// Script the given results in order
    pub fn new(results: impl IntoIterator<Item = Result<T, E>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(results.into_iter().collect())),
            fallback: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Always return `result`
    pub fn always(result: Result<T, E>) -> Self {
        Self::new([]).with_fallback(result)
    }

    /// Result returned after the script runs out
    #[must_use]
    pub fn with_fallback(self, result: Result<T, E>) -> Self {
        *self.fallback.lock() = Some(result);
        self
    }

    /// Record one call and return its scripted result
    pub fn next_result(&self) -> Option<Result<T, E>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.or_else(|| self.fallback.lock().clone())
    }

    /// Number of calls so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Results not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_filters_by_dependency() {
        let sink = RecordingEventSink::new();
        sink.emit(ResilienceEvent::attempt("a", ResilienceEventKind::AttemptStarted, 1));
        sink.emit(ResilienceEvent::attempt("b", ResilienceEventKind::AttemptStarted, 1));
        sink.emit(ResilienceEvent::attempt("a", ResilienceEventKind::AttemptSucceeded, 1));

        assert_eq!(
            sink.kinds_for("a"),
            vec![ResilienceEventKind::AttemptStarted, ResilienceEventKind::AttemptSucceeded]
        );
        assert_eq!(sink.count(ResilienceEventKind::AttemptStarted), 2);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn recording_metrics_keys_sort_labels() {
        let key = RecordingMetricsCollector::key("calls", &[("zone", "b"), ("dependency", "a")]);
        assert_eq!(key, "calls{dependency=a,zone=b}");
    }

    #[test]
    fn recording_metrics_accumulates() {
        let metrics = RecordingMetricsCollector::new();
        metrics.increment_counter("calls", &[("dependency", "a")]);
        metrics.increment_counter("calls", &[("dependency", "a")]);
        metrics.record_gauge("in_flight", 3.0, &[]);
        metrics.record_timing("latency", 20, &[]);

        assert_eq!(metrics.counter("calls{dependency=a}"), 2);
        assert_eq!(metrics.gauge("in_flight"), Some(3.0));
        assert_eq!(metrics.histogram("latency"), vec![20.0]);
    }

    #[test]
    fn scripted_calls_fall_back_after_script() {
        let script: ScriptedCalls<u32, &str> = ScriptedCalls::new([Err("e1")]).with_fallback(Ok(1));
        assert_eq!(script.remaining(), 1);
        assert_eq!(script.next_result(), Some(Err("e1")));
        assert_eq!(script.next_result(), Some(Ok(1)));
        assert_eq!(script.next_result(), Some(Ok(1)));
        assert_eq!(script.calls(), 3);
    }

    #[test]
    fn scripted_calls_clones_share_state() {
        let script: ScriptedCalls<(), ()> = ScriptedCalls::always(Ok(()));
        let clone = script.clone();
        let _ = clone.next_result();
        assert_eq!(script.calls(), 1);
    }
}
