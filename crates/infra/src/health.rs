//! Operator-facing health report
//!
//! Collects circuit snapshots and the active resilience settings into one
//! serialisable document. The overall status is the worst status of any
//! circuit; an executor that has not called anything yet is healthy.

use std::collections::BTreeMap;
use std::time::Duration;

use apiguard_common::resilience::{BackoffStrategy, CircuitSnapshot, Clock, HealthStatus};
use apiguard_common::utils::serde::duration_millis;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::executor::ResilientExecutor;
use crate::fallback::FallbackDiagnostics;

/// Deadlines in effect
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutSummary {
    #[serde(with = "duration_millis", rename = "default_ms")]
    pub default: Duration,
    /// Operation label to milliseconds
    pub operations_ms: BTreeMap<String, u64>,
}

/// Retry settings in effect
#[derive(Debug, Clone, Serialize)]
pub struct RetrySummary {
    pub max_attempts: u32,
    #[serde(with = "duration_millis", rename = "base_delay_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
}

/// Snapshot of the whole engine for a health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub generated_at: DateTime<Utc>,
    pub circuits: BTreeMap<String, CircuitSnapshot>,
    pub timeouts: TimeoutSummary,
    pub retry: RetrySummary,
    #[serde(with = "duration_millis", rename = "rate_limit_interval_ms")]
    pub rate_limit_interval: Duration,
    /// Attempts that had to wait for the rate limiter
    pub throttled_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackDiagnostics>,
}

impl HealthReport {
    pub(crate) fn collect<C: Clock>(executor: &ResilientExecutor<C>) -> Self {
        let circuits = executor.circuit_states();
        let status = circuits
            .values()
            .map(CircuitSnapshot::health)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        let retry_config = executor.retry_config();
        let (base_delay, max_delay) = match &retry_config.backoff {
            BackoffStrategy::Fixed(delay) => (*delay, *delay),
            BackoffStrategy::Exponential { initial_delay, max_delay } => {
                (*initial_delay, *max_delay)
            }
        };

        let timeouts = executor.timeouts();
        Self {
            status,
            generated_at: executor.clock().utc_now(),
            circuits,
            timeouts: TimeoutSummary {
                default: timeouts.default_timeout(),
                operations_ms: timeouts
                    .entries()
                    .into_iter()
                    .map(|(operation, timeout)| (operation, timeout.as_millis() as u64))
                    .collect(),
            },
            retry: RetrySummary { max_attempts: retry_config.max_attempts, base_delay, max_delay },
            rate_limit_interval: executor.limiter().min_interval(),
            throttled_attempts: executor.limiter().delayed_count(),
            fallback: None,
        }
    }

    /// Attach endpoint cache and reliability diagnostics
    pub fn with_fallback(mut self, diagnostics: FallbackDiagnostics) -> Self {
        self.fallback = Some(diagnostics);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
