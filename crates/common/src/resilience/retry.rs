//! Bounded retry with exponential backoff
//!
//! [`RetryExecutor`] calls an attempt function until it succeeds, the
//! [`RetryPolicy`] says stop, or `max_attempts` calls have been made. The
//! sleep after failed attempt `k` is `min(initial_delay * 2^(k-1),
//! max_delay)`, computed with checked arithmetic so large attempt numbers
//! clamp to `max_delay` instead of overflowing.
//!
//! Sleeping goes through `tokio::time`, so dropping the returned future
//! abandons both the in-flight attempt and any pending backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};

/// Errors returned once the retry loop gives up
///
/// Both variants carry the failure from the last attempt.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed with a retryable error
    #[error("All {attempts} attempts failed, last error: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The policy refused to retry this error
    #[error("Operation failed with non-retryable error after {attempts} attempt(s): {source}")]
    NonRetryable { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// The failure from the last attempt
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including the delays that were slept
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    /// Backoff slept after each failed attempt, in order
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide what to do after `attempt` (1-based) failed with `error`
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry, waiting at least this long (still capped at the max delay)
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Doubling delay starting at `initial_delay`, capped at `max_delay`
    Exponential { initial_delay: Duration, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay to sleep after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { initial_delay, max_delay } => {
                let exponent = attempt.saturating_sub(1);
                2u32.checked_pow(exponent)
                    .and_then(|factor| initial_delay.checked_mul(factor))
                    .map_or(*max_delay, |delay| delay.min(*max_delay))
            }
        }
    }

    /// Upper bound of any delay this strategy produces
    pub fn max_delay(&self) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { max_delay, .. } => *max_delay,
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: 0 to calculated_delay
    Full,
    /// Equal jitter: calculated_delay/2 to calculated_delay
    Equal,
    /// Spread of +/- the given fraction around the calculated delay
    Proportional(f64),
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }

        let mut rng = rand::thread_rng();
        match self {
            Jitter::None => delay,
            Jitter::Full => delay.mul_f64(rng.gen_range(0.0..=1.0)),
            Jitter::Equal => {
                let half = delay / 2;
                half + half.mul_f64(rng.gen_range(0.0..=1.0))
            }
            Jitter::Proportional(fraction) => {
                let spread = fraction.clamp(0.0, 1.0);
                delay.mul_f64(rng.gen_range((1.0 - spread)..=(1.0 + spread)))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one; 1 disables retries
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
            },
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be greater than 0"));
        }

        if let BackoffStrategy::Exponential { initial_delay, max_delay } = &self.backoff {
            if max_delay < initial_delay {
                return Err(ConfigError::invalid("max_delay must not be below initial_delay"));
            }
        }

        if let Jitter::Proportional(fraction) = self.jitter {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigError::invalid("jitter fraction must be within 0.0..=1.0"));
            }
        }

        Ok(())
    }

    /// Delay to sleep after failed attempt `attempt`, jitter applied
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.backoff.delay_after(attempt)).min(self.backoff.max_delay())
    }

    /// [`delay_after`](Self::delay_after) stretched to a server hint, capped
    /// at the strategy's `max_delay`
    pub fn delay_with_hint(&self, attempt: u32, hint: Duration) -> Duration {
        let cap = self.backoff.max_delay();
        if hint > cap {
            debug!(
                hint_ms = hint.as_millis() as u64,
                max_delay_ms = cap.as_millis() as u64,
                "Retry-After hint exceeds max delay, clamping"
            );
        }
        self.delay_after(attempt).max(hint).min(cap)
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(Jitter::None)
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Execute an operation with retry logic
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delays = Vec::new();
        let mut attempt = 1;

        loop {
            debug!(attempt, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, delays };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt, error = ?error, "Retry policy determined not to retry");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { attempts: attempt, source: error }),
                        attempts: attempt,
                        delays,
                    };
                }
                _ if attempt >= max_attempts => {
                    warn!(attempts = attempt, error = ?error, "All retry attempts exhausted");
                    return RetryOutcome {
                        result: Err(RetryError::Exhausted { attempts: attempt, source: error }),
                        attempts: attempt,
                        delays,
                    };
                }
                RetryDecision::Retry => self.config.delay_after(attempt),
                RetryDecision::RetryAfter(hint) => self.config.delay_with_hint(attempt, hint),
            };

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = ?error,
                "Operation failed, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::*;

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone, Copy)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Predicate-based retry policy
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
