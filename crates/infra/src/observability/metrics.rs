//! Request metrics through the `metrics` facade
//!
//! # Metrics
//! - `api_requests_total` (counter): executions by operation
//! - `api_requests_success_total` (counter): successful executions by
//!   operation
//! - `api_requests_failure_total` (counter): failed executions by operation
//!   and failure kind
//! - `api_circuit_rejections_total` (counter): calls refused by an open
//!   circuit, by operation
//! - `api_request_duration_ms` (histogram): execution latency including
//!   retries, by operation and outcome
//! - `api_fallback_attempts_total` (counter): candidates tried, by operation,
//!   candidate and outcome
//!
//! Without an installed recorder every call is a no-op.

use std::time::Duration;

use ::metrics::{counter, histogram};
use apiguard_domain::Failure;

use super::{CandidateOutcome, ExecutionObserver};

/// Observer that records counters and latency histograms
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl MetricsObserver {
    pub fn new() -> Self {
        Self
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

impl ExecutionObserver for MetricsObserver {
    fn on_success(&self, operation: &str, elapsed: Duration, _attempts: u32) {
        counter!("api_requests_total", "operation" => operation.to_string()).increment(1);
        counter!("api_requests_success_total", "operation" => operation.to_string()).increment(1);
        histogram!(
            "api_request_duration_ms",
            "operation" => operation.to_string(),
            "outcome" => "success"
        )
        .record(millis(elapsed));
    }

    fn on_failure(&self, operation: &str, elapsed: Duration, failure: &Failure) {
        counter!("api_requests_total", "operation" => operation.to_string()).increment(1);
        counter!(
            "api_requests_failure_total",
            "operation" => operation.to_string(),
            "kind" => failure.kind().as_str()
        )
        .increment(1);
        histogram!(
            "api_request_duration_ms",
            "operation" => operation.to_string(),
            "outcome" => "failure"
        )
        .record(millis(elapsed));
    }

    fn on_rejected(&self, operation: &str) {
        counter!("api_circuit_rejections_total", "operation" => operation.to_string())
            .increment(1);
    }

    fn on_fallback(&self, operation: &str, candidate: &str, outcome: CandidateOutcome) {
        let outcome = match outcome {
            CandidateOutcome::Succeeded => "succeeded",
            CandidateOutcome::Failed(kind) => kind.as_str(),
        };
        counter!(
            "api_fallback_attempts_total",
            "operation" => operation.to_string(),
            "candidate" => candidate.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}
