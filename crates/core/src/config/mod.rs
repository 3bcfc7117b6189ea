//! Resilience configuration
//!
//! A [`ResilienceConfig`] holds one [`DependencySettings`] block of defaults
//! and optional per-dependency overrides. In TOML:
//!
//! ```toml
//! [defaults]
//! max_permits = 16
//! gate_timeout_ms = 500
//!
//! [defaults.retry]
//! max_attempts = 3
//! base_delay_ms = 100
//!
//! [dependencies.payments]
//! max_permits = 4
//!
//! [dependencies.payments.circuit_breaker]
//! failure_rate_threshold = 25.0
//! ```
//!
//! Override tables are merged key by key over `[defaults]`, so `payments`
//! above keeps the default retry settings and gate timeout. Durations are
//! written in milliseconds.

mod error;
pub mod loader;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use tracing::debug;

pub use self::error::{ConfigError, ConfigResult};
use crate::resilience::{CircuitBreakerConfig, DependencyName, RetrySettings};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "CALLGUARD_CONFIG";

/// Everything needed to protect one dependency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencySettings {
    /// Concurrent in-flight calls allowed
    pub max_permits: usize,

    /// How long a call waits for a gate permit; zero fails fast
    #[serde(rename = "gate_timeout_ms", with = "callguard_common::duration_millis")]
    pub gate_timeout: Duration,

    pub retry: RetrySettings,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            max_permits: 10,
            gate_timeout: Duration::from_secs(1),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl DependencySettings {
    #[must_use]
    pub fn with_max_permits(mut self, max_permits: usize) -> Self {
        self.max_permits = max_permits;
        self
    }

    #[must_use]
    pub fn with_gate_timeout(mut self, gate_timeout: Duration) -> Self {
        self.gate_timeout = gate_timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Validate every section
    ///
    /// Errors name the failing field relative to this block, e.g.
    /// `retry.max_attempts`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_permits == 0 {
            return Err(ConfigError::invalid("max_permits", "must be greater than 0"));
        }
        if self.max_permits > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_permits",
                format!("must not exceed {}", tokio::sync::Semaphore::MAX_PERMITS),
            ));
        }

        self.retry.validate().map_err(|e| e.within("retry"))?;
        self.circuit_breaker.validate().map_err(|e| e.within("circuit_breaker"))
    }
}

/// Settings for every dependency a process calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Applied to any dependency without an override
    pub defaults: DependencySettings,

    /// Per-dependency overrides keyed by dependency name
    pub dependencies: BTreeMap<String, DependencySettings>,
}

impl ResilienceConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped values
    /// and [`ConfigError::Invalid`] for unknown top-level keys or out-of-range
    /// settings.
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let mut document: Table = toml::from_str(input)?;

        let defaults_table = match document.remove("defaults") {
            Some(Value::Table(table)) => table,
            Some(_) => return Err(ConfigError::invalid("defaults", "must be a table")),
            None => Table::new(),
        };
        let overrides = match document.remove("dependencies") {
            Some(Value::Table(table)) => table,
            Some(_) => return Err(ConfigError::invalid("dependencies", "must be a table")),
            None => Table::new(),
        };
        if let Some(unknown) = document.keys().next() {
            return Err(ConfigError::invalid(unknown.as_str(), "unknown configuration section"));
        }

        let defaults: DependencySettings = Value::Table(defaults_table.clone()).try_into()?;

        let mut dependencies = BTreeMap::new();
        for (name, value) in overrides {
            let Value::Table(table) = value else {
                return Err(ConfigError::invalid(format!("dependencies.{name}"), "must be a table"));
            };
            let merged = merge_tables(defaults_table.clone(), table);
            let settings: DependencySettings = Value::Table(merged).try_into()?;
            dependencies.insert(name, settings);
        }

        let config = Self { defaults, dependencies };
        config.validate()?;
        debug!(overrides = config.dependencies.len(), "resilience configuration parsed");
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&contents)
    }

    /// Load the file named by `CALLGUARD_CONFIG`, or defaults when unset
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::from_path(path),
            _ => Ok(Self::default()),
        }
    }

    /// Render as TOML
    ///
    /// Overrides are written out in full rather than as differences from
    /// the defaults.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Validate the defaults and every override
    pub fn validate(&self) -> ConfigResult<()> {
        self.defaults.validate().map_err(|e| e.within("defaults"))?;

        for (name, settings) in &self.dependencies {
            let prefix = format!("dependencies.{name}");
            DependencyName::parse(name).map_err(|e| e.within(&prefix))?;
            settings.validate().map_err(|e| e.within(&prefix))?;
        }

        Ok(())
    }

    /// Settings in effect for `dependency`
    pub fn for_dependency(&self, dependency: &str) -> &DependencySettings {
        self.dependencies.get(dependency).unwrap_or(&self.defaults)
    }

    /// Add or replace an override
    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>, settings: DependencySettings) -> Self {
        self.dependencies.insert(dependency.into(), settings);
        self
    }

    /// Replace the defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: DependencySettings) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Overlay `overrides` onto `base`, recursing into nested tables
fn merge_tables(mut base: Table, overrides: Table) -> Table {
    for (key, value) in overrides {
        let merged = match (base.remove(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                Value::Table(merge_tables(existing, incoming))
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
    base
}
