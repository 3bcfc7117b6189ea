//! Shared foundations for the CallGuard crates
//!
//! Everything here sits behind cargo features so that lightweight consumers
//! only pay for what they use:
//!
//! | Feature | Provides |
//! |---------|----------|
//! | `foundation` | [`CommonError`], clocks, millisecond duration serde |
//! | `observability` | resilience events, [`EventSink`], `init_tracing` |
//! | `runtime` | async test helpers and recording mocks |
//! | `test-utils` | same as `runtime`, for dev-dependency declarations |
//! | `serde` | `Serialize`/`Deserialize` on event types |

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod time;
#[cfg(feature = "foundation")]
pub mod utils;

#[cfg(feature = "observability")]
pub mod observability;

#[cfg(feature = "runtime")]
pub mod testing;

#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "observability")]
pub use observability::{
    EventSink, MetricsCollector, NoOpEventSink, ResilienceEvent, ResilienceEventKind,
};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
#[cfg(feature = "foundation")]
pub use utils::serde::{duration_millis, option_duration_millis};
