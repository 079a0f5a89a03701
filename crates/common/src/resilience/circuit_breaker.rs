//! Circuit breaker state machine
//!
//! A breaker guards one class of operation. While **Closed** every call goes
//! through and consecutive failures are counted; reaching
//! `failure_threshold` opens it. While **Open** calls are rejected without
//! touching the downstream until `recovery_timeout` has passed, at which point
//! the next [`CircuitBreaker::allow`] moves it to **Half-Open** and lets that
//! call through as the first trial. Half-Open admits at most
//! `half_open_max_calls` concurrent trials; `success_threshold` consecutive
//! successes close the circuit, any failure reopens it.
//!
//! All state lives behind a single mutex per breaker so transitions are
//! atomic with respect to concurrent callers of the same operation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use crate::utils::serde::{duration_millis, option_duration_millis};

/// Number of state transitions retained per breaker for diagnostics
pub const TRANSITION_HISTORY_LIMIT: usize = 10;

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

//==============================================================================
// State
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Coarse health derived from a breaker's state and failure rate
///
/// Ordered from best to worst so an aggregate health is the `max` of its
/// parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: &'static str,
    pub at: DateTime<Utc>,
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while Closed) that open the circuit
    pub failure_threshold: u32,
    /// Consecutive Half-Open successes that close the circuit
    pub success_threshold: u32,
    /// Time spent Open before a trial call is admitted
    pub recovery_timeout: Duration,
    /// Concurrent trial calls admitted while Half-Open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }

        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid("half_open_max_calls must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    /// Build a breaker that reads time from `clock` (useful for testing)
    pub fn build_with_clock<C: Clock>(self, clock: C) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, clock)
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Snapshot
//==============================================================================

/// Read-only view of a breaker at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip)]
    pub opened_at: Option<Instant>,
    /// Remaining cooldown while Open
    #[serde(with = "option_duration_millis", rename = "retry_in_ms")]
    pub retry_in: Option<Duration>,
    pub half_open_in_flight: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_millis", rename = "recovery_timeout_ms")]
    pub recovery_timeout: Duration,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub failure_rate: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub recent_transitions: Vec<StateTransition>,
}

impl CircuitSnapshot {
    /// Open is unhealthy; Half-Open or a failure rate above 50% is degraded.
    pub fn health(&self) -> HealthStatus {
        match self.state {
            CircuitState::Open => HealthStatus::Unhealthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Closed if self.failure_rate > 0.5 => HealthStatus::Degraded,
            CircuitState::Closed => HealthStatus::Healthy,
        }
    }
}

//==============================================================================
// Breaker
//==============================================================================

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    total_successes: u64,
    total_failures: u64,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    transitions: VecDeque<StateTransition>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            half_open_in_flight: 0,
            total_successes: 0,
            total_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY_LIMIT),
        }
    }

    fn total_calls(&self) -> u64 {
        self.total_successes + self.total_failures
    }

    fn failure_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.total_failures as f64 / total as f64
    }
}

/// Three-state circuit breaker
///
/// Generic over [`Clock`] so recovery timing can be driven by [`MockClock`]
/// in tests.
///
/// [`MockClock`]: super::clock::MockClock
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("consecutive_successes", &inner.consecutive_successes)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        Self::with_shared_clock(config, Arc::new(clock))
    }

    /// Create a breaker that shares a clock with other components
    pub fn with_shared_clock(config: CircuitBreakerConfig, clock: Arc<C>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, inner: Mutex::new(BreakerInner::new()), clock })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a request may proceed right now
    ///
    /// An expired Open circuit moves to Half-Open here, and the caller that
    /// triggered the move takes the first trial slot. Every `true` must be
    /// followed by exactly one [`record_outcome`](Self::record_outcome) or
    /// [`release_trial`](Self::release_trial).
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = self.clock.now();
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.saturating_duration_since(opened_at) >= self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen, "recovery timeout elapsed");
                    inner.consecutive_successes = 0;
                    inner.half_open_in_flight = 1;
                    debug!(
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit breaker half-open, admitting trial call"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report the final outcome of a call admitted by [`allow`](Self::allow)
    pub fn record_outcome(&self, success: bool) {
        let mut inner = self.inner.lock();
        let wall = self.clock.utc_now();

        if success {
            inner.total_successes += 1;
            inner.last_success_at = Some(wall);
        } else {
            inner.total_failures += 1;
            inner.last_failure_at = Some(wall);
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.opened_at = Some(self.clock.now());
                    self.transition(&mut inner, CircuitState::Open, "failure threshold reached");
                    warn!(
                        consecutive_failures = inner.consecutive_failures,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    let successes = inner.consecutive_successes;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                    inner.half_open_in_flight = 0;
                    self.transition(&mut inner, CircuitState::Closed, "trial calls succeeded");
                    info!(successes, "Circuit breaker closed after successful trial calls");
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.consecutive_successes = 0;
                inner.half_open_in_flight = 0;
                inner.opened_at = Some(self.clock.now());
                self.transition(&mut inner, CircuitState::Open, "trial call failed");
                warn!("Circuit breaker reopened after failure in half-open state");
            }
            (CircuitState::Open, _) => {
                warn!(success, "Outcome recorded while circuit is open, state unchanged");
            }
        }
    }

    /// Give back a Half-Open trial slot without recording an outcome
    ///
    /// Used when an admitted call is cancelled before it completes.
    pub fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Current state without the rest of the snapshot
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Remaining cooldown before a trial call is admitted, `None` unless Open
    pub fn retry_in(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        self.remaining_cooldown(&inner)
    }

    /// Observability accessor
    pub fn get_state(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            opened_at: inner.opened_at,
            retry_in: self.remaining_cooldown(&inner),
            half_open_in_flight: inner.half_open_in_flight,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout: self.config.recovery_timeout,
            total_calls: inner.total_calls(),
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            failure_rate: inner.failure_rate(),
            last_success_at: inner.last_success_at,
            last_failure_at: inner.last_failure_at,
            recent_transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    /// Force the breaker back to Closed with both counters zeroed
    ///
    /// Lifetime totals and the transition history are kept.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        inner.half_open_in_flight = 0;
        self.transition(&mut inner, CircuitState::Closed, "manual reset");
        info!("Circuit breaker manually reset to closed state");
    }

    fn remaining_cooldown(&self, inner: &BreakerInner) -> Option<Duration> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        let elapsed = self.clock.now().saturating_duration_since(opened_at);
        Some(self.config.recovery_timeout.saturating_sub(elapsed))
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, reason: &'static str) {
        let from = inner.state;
        inner.state = to;
        if inner.transitions.len() == TRANSITION_HISTORY_LIMIT {
            inner.transitions.pop_front();
        }
        inner.transitions.push_back(StateTransition { from, to, reason, at: self.clock.utc_now() });
    }
}
