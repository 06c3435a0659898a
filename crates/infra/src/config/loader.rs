//! Configuration loader
//!
//! Loads [`TripwireConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `TRIPWIRE_FAILURE_THRESHOLD` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TRIPWIRE_FAILURE_THRESHOLD`: Trip percentage (required for the env path)
//! - `TRIPWIRE_SUCCESS_THRESHOLD`: Probe successes needed to close
//! - `TRIPWIRE_CALL_TIMEOUT_MS`: Per-call deadline in milliseconds
//! - `TRIPWIRE_RESET_TIMEOUT_MS`: OPEN duration in milliseconds
//! - `TRIPWIRE_VOLUME_THRESHOLD`: Minimum calls before tripping
//! - `TRIPWIRE_TRIP_CHECK`: `on_failure` or `every_outcome`
//! - `TRIPWIRE_LOG_LEVEL`: Default log filter directive
//! - `TRIPWIRE_LOG_JSON`: Whether to log JSON lines (true/false)
//!
//! Environment configuration only sets the defaults; per-breaker overrides
//! need a file.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./tripwire.json` or `./tripwire.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tripwire_common::resilience::{BreakerSettings, TripCheck};

use super::{LoggingConfig, TripwireConfig};
use crate::errors::{InfraError, InfraResult};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variable is missing or a value is invalid, falls back to loading from a
/// config file.
///
/// # Errors
/// Returns `InfraError::Config` if configuration cannot be loaded from either
/// source, and `InfraError::Breaker` if the loaded settings are invalid.
pub fn load() -> InfraResult<TripwireConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `InfraError::Config` if `TRIPWIRE_FAILURE_THRESHOLD` is missing or
/// any variable has an unparseable value.
pub fn load_from_env() -> InfraResult<TripwireConfig> {
    let failure_threshold = env_var("TRIPWIRE_FAILURE_THRESHOLD").and_then(|s| {
        s.parse::<u8>()
            .map_err(|e| InfraError::Config(format!("Invalid failure threshold: {}", e)))
    })?;

    let trip_check = env_parse::<String>("TRIPWIRE_TRIP_CHECK")?
        .map(|s| parse_trip_check(&s))
        .transpose()?;

    let defaults = BreakerSettings {
        failure_threshold: Some(failure_threshold),
        success_threshold: env_parse("TRIPWIRE_SUCCESS_THRESHOLD")?,
        call_timeout_ms: env_parse("TRIPWIRE_CALL_TIMEOUT_MS")?,
        reset_timeout_ms: env_parse("TRIPWIRE_RESET_TIMEOUT_MS")?,
        volume_threshold: env_parse("TRIPWIRE_VOLUME_THRESHOLD")?,
        trip_check,
    };

    let logging_defaults = LoggingConfig::default();
    let logging = LoggingConfig {
        level: std::env::var("TRIPWIRE_LOG_LEVEL").unwrap_or(logging_defaults.level),
        json: env_bool("TRIPWIRE_LOG_JSON", logging_defaults.json),
    };

    let config = TripwireConfig { logging, defaults, ..TripwireConfig::default() };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `InfraError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or contains unknown keys
///
/// Returns `InfraError::Breaker` if any breaker settings fail validation.
pub fn load_from_file(path: Option<PathBuf>) -> InfraResult<TripwireConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(InfraError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            InfraError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| InfraError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    tracing::debug!(breakers = config.breakers.len(), "Configuration validated");
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`); files without
/// an extension are read as JSON.
fn parse_config(contents: &str, path: &Path) -> InfraResult<TripwireConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(InfraError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, its parents (up to 2 levels), and
/// the same layout relative to the executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("tripwire.json"),
        dir.join("tripwire.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

fn parse_trip_check(value: &str) -> InfraResult<TripCheck> {
    match value.to_ascii_lowercase().as_str() {
        "on_failure" => Ok(TripCheck::OnFailure),
        "every_outcome" => Ok(TripCheck::EveryOutcome),
        other => Err(InfraError::Config(format!("Invalid trip check: {}", other))),
    }
}

/// Get required environment variable
///
/// # Errors
/// Returns `InfraError::Config` if the variable is not set.
fn env_var(key: &str) -> InfraResult<String> {
    std::env::var(key)
        .map_err(|_| InfraError::Config(format!("Missing required environment variable: {}", key)))
}

/// Parse an optional environment variable; unset yields `Ok(None)`.
fn env_parse<T>(key: &str) -> InfraResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| InfraError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
