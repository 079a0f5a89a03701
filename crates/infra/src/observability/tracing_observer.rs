//! Structured log events for execution outcomes

use std::time::Duration;

use apiguard_common::error::ErrorClassification;
use apiguard_domain::Failure;
use tracing::{debug, error, info, warn};

use super::{CandidateOutcome, ExecutionObserver};

/// Observer that writes one `tracing` event per outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionObserver for TracingObserver {
    fn on_success(&self, operation: &str, elapsed: Duration, attempts: u32) {
        if attempts > 1 {
            info!(
                operation,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "API request succeeded after retries"
            );
        } else {
            debug!(operation, elapsed_ms = elapsed.as_millis() as u64, "API request succeeded");
        }
    }

    fn on_failure(&self, operation: &str, elapsed: Duration, failure: &Failure) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let kind = failure.kind().as_str();
        if failure.is_critical() {
            error!(operation, kind, elapsed_ms, error = %failure, "API request failed");
        } else {
            warn!(operation, kind, elapsed_ms, error = %failure, "API request failed");
        }
    }

    fn on_rejected(&self, operation: &str) {
        warn!(operation, "API request rejected by open circuit");
    }

    fn on_fallback(&self, operation: &str, candidate: &str, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Succeeded => {
                debug!(operation, candidate, "Fallback candidate succeeded");
            }
            CandidateOutcome::Failed(kind) => {
                debug!(operation, candidate, kind = kind.as_str(), "Fallback candidate failed");
            }
        }
    }
}
