//! Per-operation timeout table
//!
//! Maps an operation label to the deadline applied to each of its attempts,
//! falling back to a default for labels without an entry. The table is
//! populated at startup and read on every attempt; [`TimeoutTable::set_timeout`]
//! exists for administrative changes.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::circuit_breaker::{ConfigError, ConfigResult};

/// An attempt did not complete before its deadline and was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {timeout:?}")]
pub struct TimedOut {
    pub timeout: Duration,
}

/// Operation label to deadline mapping with a default
#[derive(Debug)]
pub struct TimeoutTable {
    default_timeout: Duration,
    overrides: RwLock<BTreeMap<String, Duration>>,
}

impl TimeoutTable {
    pub fn new(default_timeout: Duration) -> ConfigResult<Self> {
        if default_timeout.is_zero() {
            return Err(ConfigError::invalid("default timeout must be greater than zero"));
        }
        Ok(Self { default_timeout, overrides: RwLock::new(BTreeMap::new()) })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Deadline for `operation`, or the default when no entry exists
    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.overrides.read().get(operation).copied().unwrap_or(self.default_timeout)
    }

    /// Insert or overwrite the deadline for `operation`
    pub fn set_timeout(&self, operation: impl Into<String>, timeout: Duration) -> ConfigResult<()> {
        let operation = operation.into();
        if timeout.is_zero() {
            return Err(ConfigError::invalid(format!(
                "timeout for '{operation}' must be greater than zero"
            )));
        }
        debug!(operation = %operation, timeout_ms = timeout.as_millis() as u64, "Timeout set");
        self.overrides.write().insert(operation, timeout);
        Ok(())
    }

    /// Explicit entries, sorted by label
    pub fn entries(&self) -> BTreeMap<String, Duration> {
        self.overrides.read().clone()
    }

    /// Run `future` under the deadline for `operation`
    ///
    /// On expiry the future is dropped, so nothing it would have done after
    /// the deadline can happen.
    pub async fn run<F, T>(&self, operation: &str, future: F) -> Result<T, TimedOut>
    where
        F: Future<Output = T>,
    {
        let timeout = self.timeout_for(operation);
        tokio::time::timeout(timeout, future).await.map_err(|_| TimedOut { timeout })
    }
}
