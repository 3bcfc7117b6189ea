//! `tracing-subscriber` initialization
//!
//! Binaries and integration tests call [`init_tracing`] once at startup.
//! `RUST_LOG` takes precedence over the filter passed in.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{CommonError, CommonResult};

/// Default filter when neither `RUST_LOG` nor an explicit filter is given
pub const DEFAULT_FILTER: &str = "info,callguard=debug";

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Install a global fmt subscriber with an [`EnvFilter`]
///
/// Fails if the filter directive is malformed or a global subscriber is
/// already installed.
pub fn init_tracing(filter: Option<&str>) -> CommonResult<()> {
    init_tracing_with_format(filter, LogFormat::Compact)
}

/// Like [`init_tracing`] with an explicit output format
pub fn init_tracing_with_format(filter: Option<&str>, format: LogFormat) -> CommonResult<()> {
    let env_filter = build_filter(filter)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };

    result.map_err(|e| CommonError::internal("init_tracing", e.to_string()))
}

fn build_filter(filter: Option<&str>) -> CommonResult<EnvFilter> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    let directive = filter.unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|e| CommonError::config_field("log_filter", format!("{directive}: {e}")))
}
