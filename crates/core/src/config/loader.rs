//! Configuration loader
//!
//! ## Loading Strategy
//! 1. If `CALLGUARD_CONFIG` is set, load that file (a missing file is an error)
//! 2. Otherwise probe the standard locations for a `callguard.toml`
//! 3. If none exists, use [`ResilienceConfig::default`]
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./callguard.toml` (current working directory)
//! 2. `./config/callguard.toml`
//! 3. `callguard.toml` next to the executable

use std::path::PathBuf;

use tracing::{debug, info};

use super::{ConfigError, ConfigResult, ResilienceConfig, CONFIG_PATH_ENV};

/// File name looked for in each probed directory
pub const CONFIG_FILE_NAME: &str = "callguard.toml";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns an error if the selected file cannot be read, parsed or validated.
/// A missing file is only an error when named explicitly.
pub fn load() -> ConfigResult<ResilienceConfig> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return load_from_file(Some(PathBuf::from(path)));
    }

    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            debug!("no configuration file found, using defaults");
            Ok(ResilienceConfig::default())
        }
    }
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations and fails when none
/// exists.
pub fn load_from_file(path: Option<PathBuf>) -> ConfigResult<ResilienceConfig> {
    let config_path = match path {
        Some(path) => path,
        None => probe_config_paths().ok_or_else(|| {
            ConfigError::invalid("path", "no callguard.toml found in any of the standard locations")
        })?,
    };

    info!(path = %config_path.display(), "loading resilience configuration");
    ResilienceConfig::from_path(&config_path)
}

/// Probe the standard locations for a configuration file
///
/// Returns the first file that exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CONFIG_FILE_NAME));
        candidates.push(cwd.join("config").join(CONFIG_FILE_NAME));
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(PathBuf::from))
    {
        candidates.push(exe_dir.join(CONFIG_FILE_NAME));
    }

    candidates.into_iter().find(|path| path.is_file())
}
