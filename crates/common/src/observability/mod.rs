//! Observability primitives
//!
//! - [`events`]: the [`ResilienceEvent`] vocabulary
//! - [`traits`]: [`EventSink`] and [`MetricsCollector`] abstractions
//! - [`sinks`]: adapters writing events to `tracing` or a metrics backend
//! - [`logging`]: subscriber initialization

pub mod events;
pub mod logging;
pub mod sinks;
pub mod traits;

pub use events::{ResilienceEvent, ResilienceEventKind};
pub use logging::{init_tracing, init_tracing_with_format, LogFormat};
pub use sinks::{CompositeEventSink, MetricsEventSink, TracingEventSink};
pub use traits::{EventSink, MetricsCollector, NoOpEventSink, NoOpMetricsCollector};
