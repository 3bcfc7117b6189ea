//! Testing utilities and helpers
//!
//! - [`async_utils`]: deadlines, polling and `assert_eventually_async!`
//! - [`mocks`]: in-memory event sink, metrics collector and scripted calls
//!
//! ## Usage
//!
//! ```rust
//! use callguard_common::testing::{RecordingEventSink, ScriptedCalls};
//! use callguard_common::time::MockClock;
//!
//! let clock = MockClock::new();
//! let sink = RecordingEventSink::new();
//! let remote: ScriptedCalls<u32, String> = ScriptedCalls::always(Ok(1));
//! # let _ = (clock, sink, remote);
//! ```

pub mod async_utils;
pub mod mocks;

pub use async_utils::{poll_until, timeout_ok, yield_times};
pub use mocks::{RecordingEventSink, RecordingMetricsCollector, ScriptedCalls};

pub use crate::time::{Clock, MockClock, SystemClock};
