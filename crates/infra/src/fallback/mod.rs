//! Endpoint fallback for operations with several candidate endpoints
//!
//! Some operations can be served by more than one endpoint configuration and
//! the right one is not known in advance. [`EndpointFallbackResolver`] tries
//! the candidates one at a time through the [`ResilientExecutor`], remembers
//! which one worked in an [`EndpointCache`], and keeps per-candidate
//! statistics in a [`ReliabilityTracker`].
//!
//! [`ResilientExecutor`]: crate::executor::ResilientExecutor

pub mod cache;
pub mod reliability;
pub mod resolver;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use apiguard_domain::{EndpointPriority, Failure, FailureKind, ResponseShape, Result, StatusClass};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use thiserror::Error;

pub use self::cache::{CachedEndpointInfo, EndpointCache};
pub use self::reliability::{CandidateReliability, EndpointReliability, ReliabilityTracker};
pub use self::resolver::{EndpointFallbackResolver, FallbackDiagnostics};

type AttemptFn<'a, T> = Box<dyn FnMut() -> BoxFuture<'a, Result<T>> + Send + 'a>;

/// One way of performing an operation
pub struct EndpointCandidate<'a, T> {
    name: String,
    priority: EndpointPriority,
    shape: ResponseShape,
    attempt: AttemptFn<'a, T>,
}

impl<'a, T> EndpointCandidate<'a, T> {
    /// Candidate with medium priority and a generic response shape
    ///
    /// `attempt` is called once per try, as with
    /// [`ResilientExecutor::execute`](crate::executor::ResilientExecutor::execute).
    pub fn new<F, Fut>(name: impl Into<String>, mut attempt: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        Self {
            name: name.into(),
            priority: EndpointPriority::default(),
            shape: ResponseShape::default(),
            attempt: Box::new(move || attempt().boxed()),
        }
    }

    pub fn priority(mut self, priority: EndpointPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint_priority(&self) -> EndpointPriority {
        self.priority
    }

    pub fn response_shape(&self) -> ResponseShape {
        self.shape
    }

    pub(crate) fn call(&mut self) -> BoxFuture<'a, Result<T>> {
        (self.attempt)()
    }
}

impl<T> fmt::Debug for EndpointCandidate<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointCandidate")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Why one candidate was given up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub candidate: String,
    pub kind: FailureKind,
    /// HTTP status when the server sent one, otherwise the kind label
    pub code: String,
    pub status_class: StatusClass,
    pub failure: Failure,
}

impl CandidateFailure {
    pub fn new(candidate: impl Into<String>, failure: Failure) -> Self {
        Self {
            candidate: candidate.into(),
            kind: failure.kind(),
            code: failure.code(),
            status_class: failure.status_class(),
            failure,
        }
    }
}

/// Successful outcome of a fallback resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// A candidate returned a value
    Resolved {
        value: T,
        candidate: String,
        shape: ResponseShape,
        /// The candidate was tried first because it was cached
        from_cache: bool,
        /// Candidates that failed before this one, in attempt order
        attempted: Vec<CandidateFailure>,
    },
    /// Every candidate failed, mostly with client errors; `value` is the
    /// type's default
    Degraded { value: T, warning: String, attempted: Vec<CandidateFailure> },
}

impl<T> Resolution<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Resolved { value, .. } | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Resolved { value, .. } | Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn attempted(&self) -> &[CandidateFailure] {
        match self {
            Self::Resolved { attempted, .. } | Self::Degraded { attempted, .. } => attempted,
        }
    }

    /// Name of the candidate that produced the value, `None` when degraded
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::Resolved { candidate, .. } => Some(candidate),
            Self::Degraded { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Resolved { .. } => None,
            Self::Degraded { warning, .. } => Some(warning),
        }
    }
}

/// Fallback resolution failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FallbackError {
    #[error("No endpoint candidates supplied for '{operation}'")]
    NoCandidates { operation: String },

    /// Every candidate failed; one entry per candidate in attempt order
    #[error("All {} endpoint candidates failed for '{operation}'", .failures.len())]
    Exhausted { operation: String, failures: Vec<CandidateFailure> },

    #[error("Endpoint fallback for '{operation}' was cancelled")]
    Cancelled { operation: String, attempted: Vec<CandidateFailure> },

    /// The operation's circuit refused the call before a candidate ran
    #[error("Circuit open for '{operation}', endpoint fallback not attempted")]
    CircuitOpen {
        operation: String,
        retry_in: Option<Duration>,
        attempted: Vec<CandidateFailure>,
    },
}

impl FallbackError {
    pub fn operation(&self) -> &str {
        match self {
            Self::NoCandidates { operation }
            | Self::Exhausted { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::CircuitOpen { operation, .. } => operation,
        }
    }

    pub fn failures(&self) -> &[CandidateFailure] {
        match self {
            Self::NoCandidates { .. } => &[],
            Self::Exhausted { failures, .. } => failures,
            Self::Cancelled { attempted, .. } | Self::CircuitOpen { attempted, .. } => attempted,
        }
    }

    /// Failure of the last candidate tried
    pub fn last_failure(&self) -> Option<&Failure> {
        self.failures().last().map(|entry| &entry.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_failure_captures_classification() {
        let entry = CandidateFailure::new(
            "monitors_search",
            Failure::Rejected { status: 400, message: "unknown field".into() },
        );
        assert_eq!(entry.kind, FailureKind::Rejected);
        assert_eq!(entry.code, "400");
        assert_eq!(entry.status_class, StatusClass::ClientError);
    }

    #[test]
    fn test_exhausted_message_counts_candidates() {
        let err = FallbackError::Exhausted {
            operation: "alerts".into(),
            failures: vec![
                CandidateFailure::new("a", Failure::upstream(Some(500), "boom")),
                CandidateFailure::new("b", Failure::network("reset")),
            ],
        };
        assert_eq!(err.to_string(), "All 2 endpoint candidates failed for 'alerts'");
        assert_eq!(err.operation(), "alerts");
        assert_eq!(err.last_failure().map(Failure::kind), Some(FailureKind::Network));
    }

    #[test]
    fn test_candidate_builder_sets_tags() {
        let candidate =
            EndpointCandidate::new("monitors_list", || async { Ok::<_, Failure>(()) })
                .priority(EndpointPriority::Low)
                .shape(ResponseShape::MonitorList);
        assert_eq!(candidate.name(), "monitors_list");
        assert_eq!(candidate.endpoint_priority(), EndpointPriority::Low);
        assert_eq!(candidate.response_shape(), ResponseShape::MonitorList);
        assert!(format!("{candidate:?}").contains("monitors_list"));
    }
}
