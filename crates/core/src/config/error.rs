use std::path::PathBuf;

use callguard_common::{impl_error_classification, CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
///
/// Raised when settings are out of range, when a configuration file cannot
/// be read, or when its TOML cannot be parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Create an error for an out-of-range field
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }

    /// Prefix the offending field with its location in a larger document
    ///
    /// `retry.max_attempts` inside `dependencies.payments` becomes
    /// `dependencies.payments.retry.max_attempts`.
    #[must_use]
    pub fn within(self, prefix: &str) -> Self {
        match self {
            Self::Invalid { field, message } => {
                Self::Invalid { field: format!("{prefix}.{field}"), message }
            }
            other => other,
        }
    }

    /// Dotted path of the offending field, if the error names one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl_error_classification!(ConfigError, Common,
    Self::Invalid { .. } | Self::Read { .. } | Self::Parse(_) | Self::Serialize(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
    }
);

impl From<ConfigError> for CommonError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Common(inner) => inner,
            ConfigError::Invalid { field, message } => CommonError::config_field(field, message),
            other => CommonError::config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_prefixes_field() {
        let err = ConfigError::invalid("max_attempts", "must be at least 1")
            .within("retry")
            .within("dependencies.payments");

        assert_eq!(err.field(), Some("dependencies.payments.retry.max_attempts"));
        assert_eq!(
            err.to_string(),
            "invalid value for 'dependencies.payments.retry.max_attempts': must be at least 1"
        );
    }

    #[test]
    fn test_within_leaves_other_variants() {
        let err = ConfigError::from(CommonError::config("boom")).within("defaults");
        assert!(err.field().is_none());
    }

    #[test]
    fn test_classification() {
        let err = ConfigError::invalid("max_permits", "must be greater than 0");
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert!(!err.is_critical());
        assert!(err.retry_after().is_none());
    }

    #[test]
    fn test_into_common_error_keeps_field() {
        let common: CommonError = ConfigError::invalid("gate_timeout", "too large").into();
        assert!(matches!(
            common,
            CommonError::Config { field: Some(ref field), .. } if field == "gate_timeout"
        ));
    }
}
