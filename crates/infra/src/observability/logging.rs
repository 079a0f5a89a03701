//! Structured logging initialisation
//!
//! Installs a global `tracing` subscriber: an `EnvFilter` built from
//! `RUST_LOG` when set, otherwise from the configured level, plus either a
//! human-readable or a JSON formatting layer.

use apiguard_domain::{Failure, LogFormat, LoggingConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the filter, preferring `RUST_LOG` over the configured level
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Failure::config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns `Failure::Config` if the level directive is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    installed.map_err(|e| Failure::config(format!("Failed to install tracing subscriber: {e}")))
}
