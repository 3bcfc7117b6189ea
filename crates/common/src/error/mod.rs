//! Shared error vocabulary
//!
//! Every crate in the workspace reports failures in terms of three things
//! defined here:
//!
//! - [`CommonError`]: failures that more than one module can produce
//!   (bad configuration, open circuits, exhausted gates, timeouts)
//! - [`ErrorClassification`]: retryability and severity, so callers can
//!   decide what to do without matching on concrete error types
//! - [`ErrorSeverity`]: the level used for logging and alerting
//!
//! Module errors wrap `CommonError` in a transparent variant instead of
//! duplicating it, and classify their own variants with
//! [`impl_error_classification!`](crate::impl_error_classification):
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum ConfigError {
//!     #[error("invalid value for '{field}': {message}")]
//!     Invalid { field: String, message: String },
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_classification!(ConfigError, Common,
//!     Self::Invalid { .. } => { retryable: false, severity: ErrorSeverity::Error }
//! );
//! ```
//!
//! | Severity | Meaning | Examples |
//! |----------|---------|----------|
//! | `Info` | Expected, no action | - |
//! | `Warning` | Degraded, self-healing | Open circuit, exhausted gate, timeout |
//! | `Error` | Needs attention | Dependency failure, invalid configuration |
//! | `Critical` | Broken invariant | Internal errors |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result alias for [`CommonError`]
pub type CommonResult<T> = Result<T, CommonError>;

/// Failures shared across modules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// A setting is missing, malformed or out of range
    #[error("configuration error{}: {message}", field_suffix(.field.as_deref()))]
    Config { message: String, field: Option<String> },

    /// A circuit breaker refused the call
    #[error("circuit open for '{dependency}'{}", retry_suffix(.retry_after.as_ref()))]
    CircuitOpen { dependency: String, retry_after: Option<Duration> },

    /// No concurrency permit was available in time
    #[error("concurrency limit of {max_permits} reached for '{dependency}'")]
    ConcurrencyLimit { dependency: String, max_permits: usize },

    /// An operation exceeded its deadline
    #[error("'{operation}' timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    /// A remote dependency returned an error
    #[error("'{dependency}' failed: {message}")]
    Backend { dependency: String, message: String, retryable: bool },

    /// Encoding or decoding failed
    #[error("{format} error: {message}")]
    Serialization { format: &'static str, message: String },

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(String),

    /// An invariant did not hold
    #[error("internal error in {component}: {message}")]
    Internal { component: String, message: String },
}

fn field_suffix(field: Option<&str>) -> String {
    field.map(|f| format!(" in '{f}'")).unwrap_or_default()
}

fn retry_suffix(retry_after: Option<&Duration>) -> String {
    retry_after.map(|d| format!(", retry in {d:?}")).unwrap_or_default()
}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Configuration error attributed to a dotted field path
    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    pub fn circuit_open(dependency: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::CircuitOpen { dependency: dependency.into(), retry_after }
    }

    pub fn concurrency_limit(dependency: impl Into<String>, max_permits: usize) -> Self {
        Self::ConcurrencyLimit { dependency: dependency.into(), max_permits }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout { operation: operation.into(), limit }
    }

    pub fn backend(dependency: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { dependency: dependency.into(), message: message.into(), retryable }
    }

    pub fn serialization(format: &'static str, message: impl Into<String>) -> Self {
        Self::Serialization { format, message: message.into() }
    }

    pub fn internal(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { component: component.into(), message: message.into() }
    }

    /// Stable snake_case category, used as the `error_kind` log field
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::ConcurrencyLimit { .. } => "concurrency_limit",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend",
            Self::Serialization { .. } => "serialization",
            Self::Io(_) => "io",
            Self::Internal { .. } => "internal",
        }
    }

    /// Key/value pairs for structured logging
    ///
    /// The first pair is always `error_kind`.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("error_kind", self.kind().to_string())];
        let millis = |d: &Duration| d.as_millis().to_string();

        match self {
            Self::Config { message, field } => {
                fields.extend(field.iter().map(|f| ("field", f.clone())));
                fields.push(("message", message.clone()));
            }
            Self::CircuitOpen { dependency, retry_after } => {
                fields.push(("dependency", dependency.clone()));
                fields.extend(retry_after.iter().map(|d| ("retry_after_ms", millis(d))));
            }
            Self::ConcurrencyLimit { dependency, max_permits } => {
                fields.push(("dependency", dependency.clone()));
                fields.push(("max_permits", max_permits.to_string()));
            }
            Self::Timeout { operation, limit } => {
                fields.push(("operation", operation.clone()));
                fields.push(("limit_ms", millis(limit)));
            }
            Self::Backend { dependency, message, retryable } => {
                fields.push(("dependency", dependency.clone()));
                fields.push(("message", message.clone()));
                fields.push(("retryable", retryable.to_string()));
            }
            Self::Serialization { format, message } => {
                fields.push(("format", (*format).to_string()));
                fields.push(("message", message.clone()));
            }
            Self::Io(message) => fields.push(("message", message.clone())),
            Self::Internal { component, message } => {
                fields.push(("component", component.clone()));
                fields.push(("message", message.clone()));
            }
        }

        fields
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::ConcurrencyLimit { .. } | Self::Timeout { .. } => true,
            Self::Backend { retryable, .. } => *retryable,
            Self::Config { .. } | Self::Serialization { .. } | Self::Io(_) | Self::Internal { .. } => {
                false
            }
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::ConcurrencyLimit { .. } | Self::Timeout { .. } => {
                ErrorSeverity::Warning
            }
            Self::Internal { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization("TOML", err.to_string())
    }
}

/// Retryability and severity of an error
pub trait ErrorClassification {
    /// Whether the same call may succeed if repeated later
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    /// Whether someone should be paged
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Earliest point a retry makes sense, when the error knows it
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Severity for logging and alerting, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implement [`ErrorClassification`] for an error that wraps [`CommonError`]
///
/// The wrapped variant delegates. Every other variant lists its
/// retryability and severity, plus an optional `retry_after` expression.
/// `is_critical` follows from severity.
///
/// ```rust,ignore
/// impl_error_classification!(ClientError, Common,
///     Self::RateLimited(_) => {
///         retryable: true,
///         severity: ErrorSeverity::Warning,
///         retry_after: Some(Duration::from_secs(1)),
///     },
///     Self::BadRequest(_) => { retryable: false, severity: ErrorSeverity::Error }
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error:ty, $common:ident
        $(, $pattern:pat => {
            retryable: $retryable:expr,
            severity: $severity:expr
            $(, retry_after: $retry_after:expr)?
            $(,)?
        })*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common(inner) => $crate::error::ErrorClassification::is_retryable(inner),
                    $($pattern => $retryable,)*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    Self::$common(inner) => $crate::error::ErrorClassification::severity(inner),
                    $($pattern => $severity,)*
                }
            }

            fn retry_after(&self) -> ::std::option::Option<::std::time::Duration> {
                match self {
                    Self::$common(inner) => $crate::error::ErrorClassification::retry_after(inner),
                    $($($pattern => $retry_after,)?)*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_display_with_and_without_field() {
        assert_eq!(CommonError::config("missing file").to_string(), "configuration error: missing file");
        assert_eq!(
            CommonError::config_field("defaults.max_permits", "must be greater than 0").to_string(),
            "configuration error in 'defaults.max_permits': must be greater than 0"
        );
    }

    /// Validates classification of an open circuit.
    ///
    /// Assertions:
    /// - Retryable warning carrying its retry hint.
    /// - Display mentions the hint only when present.
    #[test]
    fn test_circuit_open_classification() {
        let err = CommonError::circuit_open("payments", Some(Duration::from_secs(30)));
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(err.to_string(), "circuit open for 'payments', retry in 30s");

        let err = CommonError::circuit_open("payments", None);
        assert_eq!(err.to_string(), "circuit open for 'payments'");
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_backend_retryability_follows_flag() {
        assert!(CommonError::backend("inventory", "503", true).is_retryable());
        assert!(!CommonError::backend("inventory", "400", false).is_retryable());
        assert_eq!(CommonError::backend("inventory", "400", false).severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_internal_is_critical() {
        let err = CommonError::internal("gate", "permit leaked");
        assert!(err.is_critical());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "internal error in gate: permit leaked");
    }

    #[test]
    fn test_log_fields_start_with_kind() {
        let err = CommonError::timeout("payments", Duration::from_millis(250));
        let fields = err.log_fields();
        assert_eq!(fields[0], ("error_kind", "timeout".to_string()));
        assert!(fields.contains(&("limit_ms", "250".to_string())));
    }

    #[test]
    fn test_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "callguard.toml");
        assert_eq!(CommonError::from(io).kind(), "io");

        let parse = toml::from_str::<toml::Table>("key = ").unwrap_err();
        let err = CommonError::from(parse);
        assert!(err.to_string().starts_with("TOML error"));
    }

    #[test]
    fn test_severity_order_and_names() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
    }
}
