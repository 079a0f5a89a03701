//! Resilience patterns for calling unreliable remote services
//!
//! This module provides **generic, reusable** building blocks:
//! - **Circuit Breaker**: stops calling a dependency that keeps failing and
//!   probes it again after a cooldown
//! - **Retry**: bounded retries with exponential backoff and optional jitter
//! - **Rate Limiter**: minimum spacing between attempt start times
//! - **Timeouts**: per-operation deadlines with a default
//!
//! The primitives are generic over error types and know nothing about HTTP.
//! `apiguard-infra` composes them into the request executor.
//!
//! Time-dependent state (breaker cooldowns) reads a [`Clock`] so tests can
//! drive it with [`MockClock`]; sleeps go through `tokio::time` so tests can
//! run on a paused runtime.

pub mod circuit_breaker;
pub mod clock;
pub mod rate_limiter;
pub mod retry;
pub mod timeouts;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitSnapshot,
    CircuitState, ConfigError, ConfigResult, HealthStatus, StateTransition,
    TRANSITION_HISTORY_LIMIT,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use rate_limiter::IntervalLimiter;
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
pub use timeouts::{TimedOut, TimeoutTable};
