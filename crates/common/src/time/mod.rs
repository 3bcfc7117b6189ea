//! Time abstractions
//!
//! - [`Clock`]: monotonic and wall-clock time source
//! - [`SystemClock`]: production implementation
//! - [`MockClock`]: manually advanced implementation for tests

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
