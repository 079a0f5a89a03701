//! Configuration loader
//!
//! Loads [`ResilienceConfig`] from environment variables or a file.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `APIGUARD_TIMEOUT_SECS` is not set, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated and range warnings are
//! logged before it is returned.
//!
//! ## Environment Variables
//! - `APIGUARD_TIMEOUT_SECS`: base request timeout in seconds (required)
//! - `APIGUARD_MAX_ATTEMPTS`: attempts per execution including the first
//! - `APIGUARD_RATE_LIMIT_DELAY_MS`: minimum spacing between attempts
//! - `APIGUARD_CACHE_TTL_SECS`: endpoint cache lifetime
//! - `APIGUARD_LOG_LEVEL`: `EnvFilter` directive
//! - `APIGUARD_LOG_FORMAT`: `text` or `json`
//!
//! Optional variables that are unset take their defaults; a variable that is
//! set but unparsable is an error.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./apiguard.json` or `./apiguard.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. The same names next to the executable

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use apiguard_domain::{Failure, LogFormat, ResilienceConfig, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["apiguard.json", "apiguard.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `Failure::Config` if:
/// - Neither the environment nor any file yields a configuration
/// - File format is invalid
/// - A value is out of range
pub fn load() -> Result<ResilienceConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `APIGUARD_*` environment variables
///
/// # Errors
/// Returns `Failure::Config` if `APIGUARD_TIMEOUT_SECS` is missing, a set
/// variable cannot be parsed, or a value is out of range.
pub fn load_from_env() -> Result<ResilienceConfig> {
    let mut config = ResilienceConfig {
        timeout_secs: parse_var("APIGUARD_TIMEOUT_SECS", &env_var("APIGUARD_TIMEOUT_SECS")?)?,
        ..ResilienceConfig::default()
    };

    if let Some(attempts) = env_parse("APIGUARD_MAX_ATTEMPTS")? {
        config.max_attempts = attempts;
    }
    if let Some(delay) = env_parse("APIGUARD_RATE_LIMIT_DELAY_MS")? {
        config.rate_limit_delay_ms = delay;
    }
    if let Some(ttl) = env_parse("APIGUARD_CACHE_TTL_SECS")? {
        config.endpoint_cache_ttl_secs = ttl;
    }
    if let Some(level) = env_opt("APIGUARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env_opt("APIGUARD_LOG_FORMAT") {
        config.logging.format = format.parse::<LogFormat>()?;
    }

    checked(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations via
/// [`probe_config_paths`].
///
/// # Errors
/// Returns `Failure::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A value is out of range
pub fn load_from_file(path: Option<PathBuf>) -> Result<ResilienceConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(Failure::config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            Failure::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| Failure::config(format!("Failed to read config file: {e}")))?;

    checked(parse_config(&contents, &config_path)?)
}

/// Parse configuration by file extension (`.json` or `.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<ResilienceConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => {
            toml::from_str(contents).map_err(|e| Failure::config(format!("Invalid TOML format: {e}")))
        }
        "json" => serde_json::from_str(contents)
            .map_err(|e| Failure::config(format!("Invalid JSON format: {e}"))),
        _ => Err(Failure::config(format!("Unsupported config format: {extension}"))),
    }
}

/// Validate and log advisory warnings
fn checked(config: ResilienceConfig) -> Result<ResilienceConfig> {
    config.validate()?;
    for warning in config.warnings() {
        tracing::warn!(field = warning.field, "{}", warning.message);
    }
    Ok(config)
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| Failure::config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env_opt(key).map(|raw| parse_var(key, &raw)).transpose()
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| Failure::config(format!("Invalid value for {key}: {e}")))
}
