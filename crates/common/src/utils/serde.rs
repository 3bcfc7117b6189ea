//! Serde helpers for configuration files
//!
//! Configuration expresses every duration as an integer number of
//! milliseconds (`gate_timeout_ms = 250`), which keeps TOML files readable and
//! avoids the nested `{ secs, nanos }` form serde uses for `Duration`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde serialization result type
type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

fn millis_u64(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `Duration` encoded as whole milliseconds (`u64`)
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use callguard_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     open_state_ms: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{millis_u64, Deserialize, Deserializer, Duration, SerializeResult, Serializer};

    /// Serialize a Duration as milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(millis_u64(duration))
    }

    /// Deserialize milliseconds into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `Option<Duration>` encoded as optional milliseconds
///
/// Pair with `#[serde(default)]` so an absent key means `None`.
pub mod option_duration_millis {
    use super::{millis_u64, Deserialize, Deserializer, Duration, SerializeResult, Serializer};

    /// Serialize `Some(d)` as milliseconds and `None` as a missing value
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&millis_u64(d)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Settings {
        #[serde(with = "duration_millis")]
        gate_timeout_ms: Duration,
        #[serde(default, with = "option_duration_millis", skip_serializing_if = "Option::is_none")]
        attempt_timeout_ms: Option<Duration>,
    }

    /// Tests that milliseconds in TOML become a Duration
    #[test]
    fn test_duration_millis_from_toml() {
        let settings: Settings = toml::from_str("gate_timeout_ms = 250").unwrap();
        assert_eq!(settings.gate_timeout_ms, Duration::from_millis(250));
        assert_eq!(settings.attempt_timeout_ms, None);
    }

    /// Validates optional milliseconds.
    ///
    /// Assertions:
    /// - A present key deserializes to `Some`.
    /// - Serializing `Some` writes the integer back.
    #[test]
    fn test_option_duration_millis_present() {
        let settings: Settings =
            toml::from_str("gate_timeout_ms = 0\nattempt_timeout_ms = 1500").unwrap();
        assert_eq!(settings.attempt_timeout_ms, Some(Duration::from_millis(1500)));

        let rendered = toml::to_string(&settings).unwrap();
        assert!(rendered.contains("attempt_timeout_ms = 1500"));
    }

    #[test]
    fn test_sub_millisecond_durations_truncate() {
        let settings =
            Settings { gate_timeout_ms: Duration::from_micros(1_999), attempt_timeout_ms: None };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"gate_timeout_ms":1}"#);
    }
}
