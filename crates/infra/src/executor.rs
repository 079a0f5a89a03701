//! Resilient execution of a single API operation
//!
//! [`ResilientExecutor`] composes the resilience primitives around a
//! caller-supplied attempt function:
//!
//! ```text
//! circuit admission ─▶ retry loop ─▶ [ throttle ─▶ deadline ─▶ attempt ]
//!        │                                   ▲
//!        └── rejected: no attempt, no wait   └── repeated per attempt
//! ```
//!
//! One circuit breaker exists per operation name; the rate limiter and the
//! timeout table are shared by every operation of the executor. Only the
//! final outcome of a retry sequence is reported to the breaker.
//!
//! Every final failure counts against the circuit, client rejections
//! included, so a failed half-open trial always reopens it. Only
//! cancellation is left unrecorded.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use apiguard_common::error::ErrorClassification;
use apiguard_common::resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, Clock, ConfigError,
    IntervalLimiter, Jitter, RetryConfig, RetryDecision, RetryExecutor, RetryPolicy,
    SystemClock, TimedOut, TimeoutTable,
};
use apiguard_domain::{Failure, ResilienceConfig, Result};
use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::health::HealthReport;
use crate::observability::ExecutionObserver;

pub(crate) fn config_failure(err: ConfigError) -> Failure {
    Failure::config(err.to_string())
}

/// Retry classification for [`Failure`]
///
/// Transient failures are retried; a rate-limit hint stretches the next
/// backoff. Everything else stops the loop on first occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePolicy;

impl RetryPolicy<Failure> for FailurePolicy {
    fn should_retry(&self, failure: &Failure, _attempt: u32) -> RetryDecision {
        if !failure.is_retryable() {
            return RetryDecision::Stop;
        }
        match failure.retry_after() {
            Some(hint) => RetryDecision::RetryAfter(hint),
            None => RetryDecision::Retry,
        }
    }
}

/// Builder for [`ResilientExecutor`]
pub struct ResilientExecutorBuilder<C: Clock = SystemClock> {
    min_interval: Duration,
    default_timeout: Duration,
    operation_timeouts: BTreeMap<String, Duration>,
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
    clock: Arc<C>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl Default for ResilientExecutorBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientExecutorBuilder<SystemClock> {
    /// Builder with the stock defaults: 1s spacing, 30s deadline, 3
    /// attempts backing off from 1s, breaker 5/60s/3
    pub fn new() -> Self {
        let defaults = ResilienceConfig::default();
        Self {
            min_interval: defaults.rate_limit_delay(),
            default_timeout: defaults.timeout(),
            operation_timeouts: BTreeMap::new(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
        }
    }
}

impl<C: Clock> ResilientExecutorBuilder<C> {
    /// Take every setting from a configuration document
    ///
    /// Retry backoff starts at the pacing interval and is capped at
    /// [`ResilienceConfig::retry_max_delay`]; the timeout table gets the
    /// derived per-operation values.
    pub fn config(mut self, config: &ResilienceConfig) -> Self {
        self.min_interval = config.rate_limit_delay();
        self.default_timeout = config.timeout();
        self.operation_timeouts = config.operation_timeout_table();
        self.retry = RetryConfig {
            max_attempts: config.max_attempts,
            backoff: BackoffStrategy::Exponential {
                initial_delay: config.retry_base_delay(),
                max_delay: config.retry_max_delay(),
            },
            jitter: Jitter::None,
        };
        self.breaker = CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold(),
            success_threshold: config.circuit_breaker.success_threshold,
            recovery_timeout: config.circuit_recovery_timeout(),
            half_open_max_calls: config.circuit_breaker.half_open_max_calls,
        };
        self
    }

    /// Use a different clock for circuit timing
    pub fn clock<C2: Clock>(self, clock: C2) -> ResilientExecutorBuilder<C2> {
        self.shared_clock(Arc::new(clock))
    }

    pub fn shared_clock<C2: Clock>(self, clock: Arc<C2>) -> ResilientExecutorBuilder<C2> {
        ResilientExecutorBuilder {
            min_interval: self.min_interval,
            default_timeout: self.default_timeout,
            operation_timeouts: self.operation_timeouts,
            retry: self.retry,
            breaker: self.breaker,
            clock,
            observers: self.observers,
        }
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, operation: impl Into<String>, timeout: Duration) -> Self {
        self.operation_timeouts.insert(operation.into(), timeout);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Attach an observer; observers are called in attachment order
    pub fn observer<O: ExecutionObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn shared_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// # Errors
    /// Returns `Failure::Config` if any timeout is zero or the retry or
    /// breaker settings are invalid.
    pub fn build(self) -> Result<ResilientExecutor<C>> {
        self.retry.validate().map_err(config_failure)?;
        self.breaker.validate().map_err(config_failure)?;

        let timeouts = TimeoutTable::new(self.default_timeout).map_err(config_failure)?;
        for (operation, timeout) in self.operation_timeouts {
            timeouts.set_timeout(operation, timeout).map_err(config_failure)?;
        }

        Ok(ResilientExecutor {
            limiter: IntervalLimiter::new(self.min_interval),
            timeouts,
            retry: RetryExecutor::new(self.retry, FailurePolicy),
            breaker_config: self.breaker,
            breakers: DashMap::new(),
            clock: self.clock,
            observers: self.observers,
        })
    }
}

/// Circuit breaking, pacing, deadlines and retries around API attempts
pub struct ResilientExecutor<C: Clock = SystemClock> {
    limiter: IntervalLimiter,
    timeouts: TimeoutTable,
    retry: RetryExecutor<FailurePolicy>,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    clock: Arc<C>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl<C: Clock> fmt::Debug for ResilientExecutor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("limiter", &self.limiter)
            .field("timeouts", &self.timeouts)
            .field("retry", self.retry.config())
            .field("breaker_config", &self.breaker_config)
            .field("circuits", &self.breakers.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ResilientExecutor<SystemClock> {
    pub fn builder() -> ResilientExecutorBuilder<SystemClock> {
        ResilientExecutorBuilder::new()
    }

    /// Validate `config` and build an executor from it
    ///
    /// # Errors
    /// Returns `Failure::Config` for any out-of-range setting.
    pub fn from_config(config: &ResilienceConfig) -> Result<Self> {
        config.validate()?;
        Self::builder().config(config).build()
    }
}

impl<C: Clock> ResilientExecutor<C> {
    /// Run `attempt` under the operation's circuit, the shared rate limiter,
    /// the operation's deadline and the retry policy
    ///
    /// `attempt` is called once per try and must return a fresh future;
    /// nothing should happen until that future is polled, since it is
    /// created before the throttle wait.
    ///
    /// # Errors
    /// - `CircuitOpen` without invoking `attempt` when the circuit refuses
    /// - the last attempt's failure once retries are exhausted
    /// - a non-retryable failure on its first occurrence
    pub async fn execute<T, F, Fut>(&self, operation: &str, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, None, attempt).await
    }

    /// [`execute`](Self::execute) that stops as soon as `cancel` fires
    ///
    /// Cancellation interrupts the throttle wait, the in-flight attempt and
    /// the backoff sleep alike, returns `Failure::Cancelled` and leaves the
    /// circuit untouched.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, Some(cancel), attempt).await
    }

    #[instrument(skip_all, fields(operation = %operation))]
    async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Failure::Cancelled);
        }

        let breaker = self.breaker(operation)?;
        if !breaker.allow() {
            let retry_in = breaker.retry_in();
            debug!(
                retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                "Circuit open, rejecting call"
            );
            for observer in &self.observers {
                observer.on_rejected(operation);
            }
            return Err(Failure::CircuitOpen { operation: operation.to_string(), retry_in });
        }

        let started = Instant::now();
        let sequence = self.retry.execute_with_outcome(|| {
            let pending = attempt();
            async move {
                self.limiter.throttle().await;
                self.timeouts
                    .run(operation, pending)
                    .await
                    .unwrap_or_else(|TimedOut { timeout }| Err(Failure::Timeout { timeout }))
            }
        });

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => None,
                outcome = sequence => Some(outcome),
            },
            None => Some(sequence.await),
        };
        let elapsed = started.elapsed();

        let Some(outcome) = outcome else {
            breaker.release_trial();
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Execution cancelled by caller");
            return Err(Failure::Cancelled);
        };

        let attempts = outcome.attempts;
        match outcome.result {
            Ok(value) => {
                breaker.record_outcome(true);
                for observer in &self.observers {
                    observer.on_success(operation, elapsed, attempts);
                }
                Ok(value)
            }
            Err(err) => {
                let failure = err.into_inner();
                if matches!(failure, Failure::Cancelled) {
                    breaker.release_trial();
                } else {
                    breaker.record_outcome(false);
                }
                for observer in &self.observers {
                    observer.on_failure(operation, elapsed, &failure);
                }
                Err(failure)
            }
        }
    }

    fn breaker(&self, operation: &str) -> Result<Arc<CircuitBreaker<C>>> {
        if let Some(existing) = self.breakers.get(operation) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self.breakers.entry(operation.to_string()).or_try_insert_with(|| {
            CircuitBreaker::with_shared_clock(self.breaker_config.clone(), Arc::clone(&self.clock))
                .map(Arc::new)
                .map_err(config_failure)
        })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Snapshot of one operation's circuit, `None` if it was never called
    pub fn circuit_state(&self, operation: &str) -> Option<CircuitSnapshot> {
        self.breakers.get(operation).map(|breaker| breaker.get_state())
    }

    /// Snapshots of every circuit, sorted by operation name
    pub fn circuit_states(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get_state()))
            .collect()
    }

    /// Force one operation's circuit closed; `false` if it does not exist
    pub fn reset_circuit(&self, operation: &str) -> bool {
        match self.breakers.get(operation) {
            Some(breaker) => {
                breaker.reset();
                info!(operation, "Circuit breaker reset by operator");
                true
            }
            None => false,
        }
    }

    /// Force every circuit closed, returning how many were reset
    pub fn reset_all_circuits(&self) -> usize {
        let mut count = 0;
        for entry in self.breakers.iter() {
            entry.value().reset();
            count += 1;
        }
        info!(count, "All circuit breakers reset by operator");
        count
    }

    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.timeouts.timeout_for(operation)
    }

    /// Administrative timeout change
    ///
    /// # Errors
    /// Returns `Failure::Config` for a zero duration.
    pub fn set_timeout(&self, operation: impl Into<String>, timeout: Duration) -> Result<()> {
        self.timeouts.set_timeout(operation, timeout).map_err(config_failure)
    }

    pub fn timeouts(&self) -> &TimeoutTable {
        &self.timeouts
    }

    pub fn limiter(&self) -> &IntervalLimiter {
        &self.limiter
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    pub fn circuit_breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker_config
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn ExecutionObserver>] {
        &self.observers
    }

    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    /// Health of every circuit plus the active settings
    pub fn health_report(&self) -> HealthReport {
        HealthReport::collect(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use apiguard_common::resilience::{CircuitState, MockClock};

    use super::*;

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .exponential_backoff(Duration::from_secs(1), Duration::from_secs(10))
            .build()
            .expect("valid retry config")
    }

    fn breaker(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(failure_threshold)
            .success_threshold(2)
            .recovery_timeout(Duration::from_secs(60))
            .half_open_max_calls(1)
            .build()
            .expect("valid breaker config")
    }

    fn executor(clock: &MockClock) -> ResilientExecutor<MockClock> {
        ResilientExecutor::builder()
            .min_interval(Duration::ZERO)
            .retry(retry(3))
            .circuit_breaker(breaker(2))
            .clock(clock.clone())
            .build()
            .expect("valid executor")
    }

    #[derive(Debug, Default)]
    struct CountingObserver {
        successes: AtomicU32,
        failures: AtomicU32,
        rejections: AtomicU32,
    }

    impl ExecutionObserver for Arc<CountingObserver> {
        fn on_success(&self, _operation: &str, _elapsed: Duration, _attempts: u32) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _operation: &str, _elapsed: Duration, _failure: &Failure) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_rejected(&self, _operation: &str) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn failing(
        executor: &ResilientExecutor<MockClock>,
        operation: &str,
        calls: &AtomicU32,
    ) -> Result<()> {
        executor
            .execute(operation, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Failure::upstream(Some(503), "unavailable"))
            })
            .await
    }

    #[test]
    fn test_failure_policy_decisions() {
        let policy = FailurePolicy;
        assert_eq!(policy.should_retry(&Failure::network("reset"), 1), RetryDecision::Retry);
        assert_eq!(
            policy.should_retry(
                &Failure::RateLimited { retry_after: Some(Duration::from_secs(4)) },
                1
            ),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(policy.should_retry(&Failure::validation("bad"), 1), RetryDecision::Stop);
        assert_eq!(policy.should_retry(&Failure::Cancelled, 1), RetryDecision::Stop);
        assert_eq!(
            policy.should_retry(&Failure::CircuitOpen { operation: "x".into(), retry_in: None }, 1),
            RetryDecision::Stop
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_records_healthy_outcome() {
        let clock = MockClock::new();
        let executor = executor(&clock);

        let value = executor.execute("search", || async { Ok(42) }).await.expect("should succeed");

        assert_eq!(value, 42);
        let snapshot = executor.circuit_state("search").expect("circuit created");
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.total_successes, 1);
    }

    /// Validates `ResilientExecutor::execute` behavior for the exhausted
    /// retries scenario.
    ///
    /// Assertions:
    /// - Confirms the attempt runs exactly `max_attempts` times.
    /// - Confirms the last failure is returned unchanged.
    /// - Confirms the breaker sees a single failure for the sequence.
    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_count_once_against_circuit() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let err = failing(&executor, "search", calls).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err, Failure::upstream(Some(503), "unavailable"));
        assert!(started.elapsed() >= Duration::from_secs(3));
        let snapshot = executor.circuit_state("search").expect("circuit created");
        assert_eq!(snapshot.consecutive_failures, 1);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_rejection_is_not_retried_and_counts_against_circuit() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let calls = &AtomicU32::new(0);

        for _ in 0..2 {
            let err = executor
                .execute("search", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Failure::Rejected { status: 400, message: "bad query".into() })
                })
                .await
                .unwrap_err();
            assert!(err.is_client_error());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = executor.circuit_state("search").expect("circuit created");
        assert_eq!(snapshot.total_failures, 2);
        assert_eq!(snapshot.state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_half_open_trial_reopens_on_local_failure() {
        let clock = MockClock::new();
        let executor = ResilientExecutor::builder()
            .min_interval(Duration::ZERO)
            .retry(retry(1))
            .circuit_breaker(breaker(1))
            .clock(clock.clone())
            .build()
            .expect("valid executor");
        let calls = &AtomicU32::new(0);

        let _ = failing(&executor, "search", calls).await;
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Open));

        clock.advance(Duration::from_secs(60));
        let err = executor
            .execute("search", || async { Err::<(), _>(Failure::config("no credentials")) })
            .await
            .unwrap_err();

        assert_eq!(err, Failure::config("no credentials"));
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Open));
    }

    /// Validates the open circuit path end to end.
    ///
    /// Assertions:
    /// - Ensures the attempt is never invoked while the circuit is open.
    /// - Confirms observers see the rejection.
    /// - Confirms the circuit half-opens after the recovery timeout and
    ///   closes after two successes.
    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_rejects_and_recovers() {
        let clock = MockClock::new();
        let observer = Arc::new(CountingObserver::default());
        let executor = ResilientExecutor::builder()
            .min_interval(Duration::ZERO)
            .retry(retry(1))
            .circuit_breaker(breaker(2))
            .observer(Arc::clone(&observer))
            .clock(clock.clone())
            .build()
            .expect("valid executor");
        let calls = &AtomicU32::new(0);

        for _ in 0..2 {
            let _ = failing(&executor, "search", calls).await;
        }
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Open));

        let err = failing(&executor, "search", calls).await.unwrap_err();
        match err {
            Failure::CircuitOpen { operation, retry_in } => {
                assert_eq!(operation, "search");
                assert_eq!(retry_in, Some(Duration::from_secs(60)));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(observer.rejections.load(Ordering::SeqCst), 1);
        assert_eq!(observer.failures.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(60));
        executor.execute("search", || async { Ok(()) }).await.expect("trial call");
        assert_eq!(
            executor.circuit_state("search").map(|s| s.state),
            Some(CircuitState::HalfOpen)
        );
        executor.execute("search", || async { Ok(()) }).await.expect("second trial call");
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Closed));
        assert_eq!(observer.successes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuits_are_isolated_per_operation() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let calls = &AtomicU32::new(0);

        for _ in 0..2 {
            let _ = failing(&executor, "search", calls).await;
        }

        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Open));
        assert!(executor.execute("dashboard", || async { Ok(()) }).await.is_ok());
        assert_eq!(executor.circuit_states().len(), 2);
    }

    /// Tests that a hung attempt is abandoned at its deadline
    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadline_produces_timeout() {
        let clock = MockClock::new();
        let executor = ResilientExecutor::builder()
            .min_interval(Duration::ZERO)
            .retry(retry(1))
            .operation_timeout("search", Duration::from_secs(2))
            .clock(clock)
            .build()
            .expect("valid executor");
        let started = Instant::now();

        let err = executor
            .execute("search", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err, Failure::Timeout { timeout: Duration::from_secs(2) });
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(executor.circuit_state("search").map(|s| s.total_failures), Some(1));
    }

    /// Tests that a Retry-After hint stretches the backoff
    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_extends_backoff() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let value = executor
            .execute("metrics", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Failure::RateLimited { retry_after: Some(Duration::from_secs(5)) })
                } else {
                    Ok("ok")
                }
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, "ok");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_paced_by_rate_limiter() {
        let executor = ResilientExecutor::builder()
            .min_interval(Duration::from_secs(2))
            .retry(retry(1))
            .build()
            .expect("valid executor");
        let started = Instant::now();

        for _ in 0..3 {
            executor.execute("collector", || async { Ok(()) }).await.expect("should succeed");
        }

        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(executor.limiter().delayed_count(), 2);
    }

    /// Validates `ResilientExecutor::execute_with_cancel` behavior during
    /// backoff.
    ///
    /// Assertions:
    /// - Confirms `Failure::Cancelled` is returned.
    /// - Ensures no further attempt starts after cancellation.
    /// - Confirms the circuit records nothing.
    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });
        let calls = &AtomicU32::new(0);

        let err = executor
            .execute_with_cancel("search", &token, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Failure::network("connection reset"))
            })
            .await
            .unwrap_err();

        assert_eq!(err, Failure::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = executor.circuit_state("search").expect("circuit created");
        assert_eq!(snapshot.total_calls, 0);
    }

    /// Tests that cancelling a half-open trial gives its slot back
    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_half_open_trial() {
        let clock = MockClock::new();
        let executor = ResilientExecutor::builder()
            .min_interval(Duration::ZERO)
            .retry(retry(1))
            .circuit_breaker(
                CircuitBreakerConfig::builder()
                    .failure_threshold(1)
                    .success_threshold(1)
                    .recovery_timeout(Duration::from_secs(10))
                    .half_open_max_calls(1)
                    .build()
                    .expect("valid breaker config"),
            )
            .clock(clock.clone())
            .build()
            .expect("valid executor");
        let calls = &AtomicU32::new(0);
        let _ = failing(&executor, "search", calls).await;
        clock.advance(Duration::from_secs(10));

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = executor
            .execute_with_cancel("search", &token, || async {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, Failure::Cancelled);

        let snapshot = executor.circuit_state("search").expect("circuit created");
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.half_open_in_flight, 0);

        executor.execute("search", || async { Ok(()) }).await.expect("trial slot available");
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_token_skips_everything() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<()> =
            executor.execute_with_cancel("search", &token, || async { Ok(()) }).await;

        assert_eq!(result, Err(Failure::Cancelled));
        assert!(executor.circuit_state("search").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_circuits() {
        let clock = MockClock::new();
        let executor = executor(&clock);
        let calls = &AtomicU32::new(0);
        for operation in ["search", "search", "metrics", "metrics"] {
            let _ = failing(&executor, operation, calls).await;
        }

        assert!(executor.reset_circuit("search"));
        assert!(!executor.reset_circuit("unknown"));
        assert_eq!(executor.circuit_state("search").map(|s| s.state), Some(CircuitState::Closed));
        assert_eq!(executor.circuit_state("metrics").map(|s| s.state), Some(CircuitState::Open));

        assert_eq!(executor.reset_all_circuits(), 2);
        assert_eq!(executor.circuit_state("metrics").map(|s| s.state), Some(CircuitState::Closed));
    }

    #[test]
    fn test_from_config_derives_settings() {
        let config = ResilienceConfig { timeout_secs: 20, ..ResilienceConfig::default() };
        let executor = ResilientExecutor::from_config(&config).expect("valid config");

        assert_eq!(executor.timeout_for("search"), Duration::from_secs(40));
        assert_eq!(executor.timeout_for("search_results"), Duration::from_secs(30));
        assert_eq!(executor.timeout_for("unknown"), Duration::from_secs(20));
        assert_eq!(executor.limiter().min_interval(), Duration::from_secs(1));
        assert_eq!(executor.retry_config().max_attempts, 3);
        assert_eq!(executor.retry_config().backoff.max_delay(), Duration::from_secs(10));
        assert_eq!(executor.circuit_breaker_config().failure_threshold, 6);
    }

    #[test]
    fn test_invalid_settings_are_config_failures() {
        let err = ResilientExecutor::builder()
            .operation_timeout("search", Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Failure::Config { .. }));

        let invalid = ResilienceConfig { max_attempts: 0, ..ResilienceConfig::default() };
        assert!(matches!(ResilientExecutor::from_config(&invalid), Err(Failure::Config { .. })));

        let executor = ResilientExecutor::builder().build().expect("defaults are valid");
        assert!(executor.set_timeout("search", Duration::ZERO).is_err());
    }
}
