//! Shared helpers
//!
//! - [`serde`]: millisecond encodings for `Duration` fields in configuration

pub mod serde;

pub use self::serde::{duration_millis, option_duration_millis};
