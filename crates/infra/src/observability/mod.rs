//! Execution observability
//!
//! The executor and the fallback resolver report what happened to an
//! [`ExecutionObserver`]; they never emit metrics themselves. Two observers
//! ship with the crate:
//! - [`TracingObserver`]: one structured log event per outcome
//! - [`MetricsObserver`]: counters and a latency histogram through the
//!   `metrics` facade, exported by whatever recorder the host installs
//!
//! [`logging::init_tracing`] installs the subscriber the log events go to.

pub mod logging;
pub mod metrics;
pub mod tracing_observer;

use std::fmt::Debug;
use std::time::Duration;

use apiguard_domain::{Failure, FailureKind};
use serde::Serialize;

pub use self::metrics::MetricsObserver;
pub use self::tracing_observer::TracingObserver;

/// Result of trying one fallback candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "kind", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Succeeded,
    Failed(FailureKind),
}

/// Hooks called by the executor and resolver
///
/// Every method has a no-op default so implementations override only what
/// they need. Hooks run inline on the calling task and must not block.
pub trait ExecutionObserver: Send + Sync + Debug {
    /// An execution returned a value after `attempts` attempts
    fn on_success(&self, _operation: &str, _elapsed: Duration, _attempts: u32) {}

    /// An execution gave up; `failure` is what the caller receives
    fn on_failure(&self, _operation: &str, _elapsed: Duration, _failure: &Failure) {}

    /// The circuit rejected the call before any attempt
    fn on_rejected(&self, _operation: &str) {}

    /// One fallback candidate finished
    fn on_fallback(&self, _operation: &str, _candidate: &str, _outcome: CandidateOutcome) {}
}
