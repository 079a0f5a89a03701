//! Resilience configuration
//!
//! A single base timeout, retry count and pacing interval drive every
//! derived setting: retry backoff bounds, circuit thresholds and the
//! per-operation timeout table. Files and environment variables supply the
//! raw values; the accessors below compute the rest.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_HALF_OPEN_MAX_CALLS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RATE_LIMIT_DELAY_MS, DEFAULT_RECOVERY_TIMEOUT_SECS, DEFAULT_SUCCESS_THRESHOLD,
    DEFAULT_TIMEOUT_SECS, MAX_ATTEMPTS_RANGE, MAX_RETRY_DELAY_SECS, MIN_FAILURE_THRESHOLD,
    OPERATION_TIMEOUT_MULTIPLIERS, RATE_LIMIT_DELAY_MS_RANGE, TIMEOUT_SECS_RANGE,
};
use crate::errors::{Failure, Result};

/// Top-level configuration for the resilience engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Base request timeout in seconds
    pub timeout_secs: u64,
    /// Total attempts per execution, including the first
    pub max_attempts: u32,
    /// Minimum spacing between attempt starts, in milliseconds
    pub rate_limit_delay_ms: u64,
    pub circuit_breaker: CircuitBreakerSettings,
    /// How long a working endpoint choice stays cached
    pub endpoint_cache_ttl_secs: u64,
    /// Explicit per-operation timeouts in seconds, applied after the derived
    /// defaults
    pub operation_timeouts: BTreeMap<String, u64>,
    pub logging: LoggingConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_delay_ms: DEFAULT_RATE_LIMIT_DELAY_MS,
            circuit_breaker: CircuitBreakerSettings::default(),
            endpoint_cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            operation_timeouts: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Circuit breaker thresholds
///
/// `failure_threshold` left unset derives from the retry budget, see
/// [`ResilienceConfig::circuit_failure_threshold`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: None,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `apiguard_infra=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), format: LogFormat::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Failure;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Failure::config(format!("Unsupported log format: {other}"))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Non-fatal configuration advice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl ResilienceConfig {
    /// Check every field against its permitted range
    ///
    /// # Errors
    /// Returns `Failure::Config` naming the first violated bound.
    pub fn validate(&self) -> Result<()> {
        if !TIMEOUT_SECS_RANGE.contains(&self.timeout_secs) {
            return Err(Failure::config(format!(
                "timeout_secs must be within {}..={}, got {}",
                TIMEOUT_SECS_RANGE.start(),
                TIMEOUT_SECS_RANGE.end(),
                self.timeout_secs
            )));
        }
        if !MAX_ATTEMPTS_RANGE.contains(&self.max_attempts) {
            return Err(Failure::config(format!(
                "max_attempts must be within {}..={}, got {}",
                MAX_ATTEMPTS_RANGE.start(),
                MAX_ATTEMPTS_RANGE.end(),
                self.max_attempts
            )));
        }
        if !RATE_LIMIT_DELAY_MS_RANGE.contains(&self.rate_limit_delay_ms) {
            return Err(Failure::config(format!(
                "rate_limit_delay_ms must be within {}..={}, got {}",
                RATE_LIMIT_DELAY_MS_RANGE.start(),
                RATE_LIMIT_DELAY_MS_RANGE.end(),
                self.rate_limit_delay_ms
            )));
        }
        if self.endpoint_cache_ttl_secs == 0 {
            return Err(Failure::config("endpoint_cache_ttl_secs must be greater than 0"));
        }

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == Some(0) {
            return Err(Failure::config("circuit_breaker.failure_threshold must be greater than 0"));
        }
        if breaker.recovery_timeout_secs == 0 {
            return Err(Failure::config(
                "circuit_breaker.recovery_timeout_secs must be greater than 0",
            ));
        }
        if breaker.success_threshold == 0 {
            return Err(Failure::config("circuit_breaker.success_threshold must be greater than 0"));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(Failure::config(
                "circuit_breaker.half_open_max_calls must be greater than 0",
            ));
        }

        if let Some((operation, _)) = self.operation_timeouts.iter().find(|(_, secs)| **secs == 0) {
            return Err(Failure::config(format!(
                "operation_timeouts.{operation} must be greater than 0"
            )));
        }

        Ok(())
    }

    /// Values that are legal but likely to cause trouble
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.timeout_secs < 10 {
            warnings.push(ConfigWarning {
                field: "timeout_secs",
                message: format!(
                    "Timeout of {}s is quite low and may cause request failures",
                    self.timeout_secs
                ),
            });
        } else if self.timeout_secs > 120 {
            warnings.push(ConfigWarning {
                field: "timeout_secs",
                message: format!("Timeout of {}s is very high", self.timeout_secs),
            });
        }

        if self.max_attempts > 5 {
            warnings.push(ConfigWarning {
                field: "max_attempts",
                message: format!(
                    "{} attempts may add long delays when the API is down",
                    self.max_attempts
                ),
            });
        }

        if self.rate_limit_delay_ms < 500 {
            warnings.push(ConfigWarning {
                field: "rate_limit_delay_ms",
                message: format!(
                    "Rate limit delay of {}ms is very low and may trigger server throttling",
                    self.rate_limit_delay_ms
                ),
            });
        }

        warnings
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn endpoint_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.endpoint_cache_ttl_secs)
    }

    /// First backoff delay; equal to the pacing interval
    pub fn retry_base_delay(&self) -> Duration {
        self.rate_limit_delay()
    }

    /// Backoff ceiling: half the base timeout, at most 60s, never below the
    /// base delay
    pub fn retry_max_delay(&self) -> Duration {
        let ceiling = (self.timeout() / 2).min(Duration::from_secs(MAX_RETRY_DELAY_SECS));
        ceiling.max(self.retry_base_delay())
    }

    /// Explicit threshold, or `max(5, max_attempts * 2)`
    pub fn circuit_failure_threshold(&self) -> u32 {
        self.circuit_breaker
            .failure_threshold
            .unwrap_or_else(|| MIN_FAILURE_THRESHOLD.max(self.max_attempts.saturating_mul(2)))
    }

    pub fn circuit_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.recovery_timeout_secs)
    }

    /// Per-operation deadlines derived from the base timeout, then
    /// overridden by `operation_timeouts`
    pub fn operation_timeout_table(&self) -> BTreeMap<String, Duration> {
        let base = self.timeout();
        let mut table: BTreeMap<String, Duration> = OPERATION_TIMEOUT_MULTIPLIERS
            .iter()
            .map(|(operation, factor)| ((*operation).to_string(), base.mul_f64(*factor)))
            .collect();

        for (operation, secs) in &self.operation_timeouts {
            table.insert(operation.clone(), Duration::from_secs(*secs));
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.rate_limit_delay(), Duration::from_secs(1));
        assert_eq!(config.endpoint_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_derived_retry_bounds() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry_max_delay(), Duration::from_secs(15));

        let long = ResilienceConfig { timeout_secs: 300, ..ResilienceConfig::default() };
        assert_eq!(long.retry_max_delay(), Duration::from_secs(60));

        let slow_pacing = ResilienceConfig {
            timeout_secs: 4,
            rate_limit_delay_ms: 5000,
            ..ResilienceConfig::default()
        };
        assert_eq!(slow_pacing.retry_max_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_circuit_failure_threshold_derivation() {
        let mut config = ResilienceConfig::default();
        assert_eq!(config.circuit_failure_threshold(), 6);

        config.max_attempts = 1;
        assert_eq!(config.circuit_failure_threshold(), 5);

        config.circuit_breaker.failure_threshold = Some(2);
        assert_eq!(config.circuit_failure_threshold(), 2);
        assert_eq!(config.circuit_recovery_timeout(), Duration::from_secs(60));
    }

    /// Validates `ResilienceConfig::operation_timeout_table` behavior for
    /// the derived multipliers scenario.
    ///
    /// Assertions:
    /// - Confirms search is doubled and search_results/metrics are 1.5x.
    /// - Confirms explicit overrides replace derived values.
    #[test]
    fn test_operation_timeout_table() {
        let mut config = ResilienceConfig { timeout_secs: 20, ..ResilienceConfig::default() };
        config.operation_timeouts.insert("metrics".into(), 90);
        config.operation_timeouts.insert("monitors".into(), 15);

        let table = config.operation_timeout_table();
        assert_eq!(table["search"], Duration::from_secs(40));
        assert_eq!(table["search_results"], Duration::from_secs(30));
        assert_eq!(table["dashboard"], Duration::from_secs(20));
        assert_eq!(table["collector"], Duration::from_secs(20));
        assert_eq!(table["metrics"], Duration::from_secs(90));
        assert_eq!(table["monitors"], Duration::from_secs(15));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases = [
            (ResilienceConfig { timeout_secs: 0, ..Default::default() }, "timeout_secs"),
            (ResilienceConfig { timeout_secs: 301, ..Default::default() }, "timeout_secs"),
            (ResilienceConfig { max_attempts: 0, ..Default::default() }, "max_attempts"),
            (ResilienceConfig { max_attempts: 11, ..Default::default() }, "max_attempts"),
            (
                ResilienceConfig { rate_limit_delay_ms: 60_001, ..Default::default() },
                "rate_limit_delay_ms",
            ),
            (
                ResilienceConfig { endpoint_cache_ttl_secs: 0, ..Default::default() },
                "endpoint_cache_ttl_secs",
            ),
        ];

        for (config, field) in cases {
            match config.validate() {
                Err(Failure::Config { message }) => {
                    assert!(message.contains(field), "{message} should name {field}")
                }
                other => panic!("expected config failure for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_rejects_zero_breaker_settings() {
        let mut config = ResilienceConfig::default();
        config.circuit_breaker.success_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = Some(0);
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.operation_timeouts.insert("search".into(), 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("operation_timeouts.search"));
    }

    #[test]
    fn test_warnings_for_aggressive_values() {
        assert!(ResilienceConfig::default().warnings().is_empty());

        let config = ResilienceConfig {
            timeout_secs: 5,
            max_attempts: 8,
            rate_limit_delay_ms: 100,
            ..ResilienceConfig::default()
        };
        let fields: Vec<_> = config.warnings().iter().map(|w| w.field).collect();
        assert_eq!(fields, vec!["timeout_secs", "max_attempts", "rate_limit_delay_ms"]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ResilienceConfig = toml::from_str(
            r#"
timeout_secs = 45

[circuit_breaker]
success_threshold = 2

[logging]
format = "json"
"#,
        )
        .expect("partial TOML should parse");

        assert_eq!(config.timeout_secs, 45);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().expect("valid"), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().expect("valid"), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
