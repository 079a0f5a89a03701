//! # Apiguard Infrastructure
//!
//! The resilience engine and its I/O edges.
//!
//! This crate contains:
//! - [`ResilientExecutor`]: circuit breaking, pacing, deadlines and retries
//!   around a single API operation
//! - [`EndpointFallbackResolver`]: sequential fallback across candidate
//!   endpoints with a last-known-good cache
//! - Health and diagnostics reports
//! - Observers for logs and metrics, and tracing initialisation
//! - Configuration loading from the environment or files
//! - A reqwest-backed single-attempt HTTP adapter
//!
//! ## Architecture
//! - Composes the generic primitives of `apiguard-common`
//! - Speaks the `Failure` taxonomy of `apiguard-domain`
//! - Contains all "impure" code (I/O, clocks, global subscribers)

pub mod config;
pub mod executor;
pub mod fallback;
pub mod health;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use executor::{FailurePolicy, ResilientExecutor, ResilientExecutorBuilder};
pub use fallback::{
    CandidateFailure, EndpointCandidate, EndpointFallbackResolver, FallbackDiagnostics,
    FallbackError, Resolution,
};
pub use health::HealthReport;
pub use http::{AuthHeaderProvider, HttpAttempt, StaticHeaders};
pub use observability::{CandidateOutcome, ExecutionObserver, MetricsObserver, TracingObserver};
