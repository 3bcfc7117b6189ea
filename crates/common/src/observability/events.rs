//! Resilience events emitted by the call runtime
//!
//! Every observable state change in the call path (an attempt starting or
//! finishing, a circuit transition, a rejection) is published as a
//! [`ResilienceEvent`] to an [`EventSink`](super::EventSink).

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
mod timestamp_ms {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::ser::Error as SerError;
    use serde::{Deserialize, Deserializer, Serializer};

    type SerializerResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    pub fn serialize<S>(timestamp: &SystemTime, serializer: S) -> SerializerResult<S>
    where
        S: Serializer,
    {
        let duration = timestamp
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SerError::custom("timestamp predates unix epoch"))?;
        let millis = u64::try_from(duration.as_millis()).map_err(|_| {
            SerError::custom("timestamp does not fit into 64-bit millisecond representation")
        })?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResilienceEventKind {
    /// An attempt is about to invoke the operation
    AttemptStarted,
    /// An attempt returned successfully
    AttemptSucceeded,
    /// An attempt failed or timed out
    AttemptFailed,
    /// The circuit transitioned to OPEN
    CircuitOpened,
    /// The circuit transitioned to CLOSED
    CircuitClosed,
    /// The circuit transitioned to HALF_OPEN
    CircuitHalfOpened,
    /// The concurrency gate had no permit within the wait budget
    GateRejected,
    /// The circuit breaker refused the call
    CircuitRejected,
}

impl ResilienceEventKind {
    /// All kinds, in declaration order
    pub const ALL: [Self; 8] = [
        Self::AttemptStarted,
        Self::AttemptSucceeded,
        Self::AttemptFailed,
        Self::CircuitOpened,
        Self::CircuitClosed,
        Self::CircuitHalfOpened,
        Self::GateRejected,
        Self::CircuitRejected,
    ];

    /// Stable snake_case name, used as a metric suffix and log field
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttemptStarted => "attempt_started",
            Self::AttemptSucceeded => "attempt_succeeded",
            Self::AttemptFailed => "attempt_failed",
            Self::CircuitOpened => "circuit_opened",
            Self::CircuitClosed => "circuit_closed",
            Self::CircuitHalfOpened => "circuit_half_opened",
            Self::GateRejected => "gate_rejected",
            Self::CircuitRejected => "circuit_rejected",
        }
    }

    /// Whether this kind reports a circuit state transition
    pub const fn is_transition(self) -> bool {
        matches!(self, Self::CircuitOpened | Self::CircuitClosed | Self::CircuitHalfOpened)
    }
}

impl fmt::Display for ResilienceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation from the call runtime
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResilienceEvent {
    /// Dependency the event belongs to
    pub dependency: Arc<str>,

    /// Event kind
    pub kind: ResilienceEventKind,

    /// 1-based attempt number for attempt events
    pub attempt: Option<u32>,

    /// Wall clock time the event was produced
    #[cfg_attr(feature = "serde", serde(with = "timestamp_ms"))]
    pub at: SystemTime,
}

impl ResilienceEvent {
    /// Create an event without an attempt number, stamped with the current time
    pub fn new(dependency: impl Into<Arc<str>>, kind: ResilienceEventKind) -> Self {
        Self { dependency: dependency.into(), kind, attempt: None, at: SystemTime::now() }
    }

    /// Create an attempt event
    pub fn attempt(
        dependency: impl Into<Arc<str>>,
        kind: ResilienceEventKind,
        attempt: u32,
    ) -> Self {
        Self { attempt: Some(attempt), ..Self::new(dependency, kind) }
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, at: SystemTime) -> Self {
        self.at = at;
        self
    }
}
