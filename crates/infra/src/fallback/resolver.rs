//! Sequential endpoint fallback with a last-known-good cache

use std::sync::Arc;
use std::time::Duration;

use apiguard_common::resilience::{Clock, SystemClock};
use apiguard_common::utils::serde::duration_secs;
use apiguard_domain::{Failure, ResilienceConfig};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::cache::{CachedEndpointInfo, EndpointCache};
use super::reliability::{CandidateReliability, ReliabilityTracker};
use super::{CandidateFailure, EndpointCandidate, FallbackError, Resolution};
use crate::executor::ResilientExecutor;
use crate::health::HealthReport;
use crate::observability::CandidateOutcome;

/// Cache and reliability state for operators
#[derive(Debug, Clone, Serialize)]
pub struct FallbackDiagnostics {
    #[serde(with = "duration_secs", rename = "cache_ttl_secs")]
    pub cache_ttl: Duration,
    pub cached: Vec<CachedEndpointInfo>,
    pub reliability: Vec<CandidateReliability>,
}

/// Tries candidate endpoints in order until one succeeds
///
/// The candidate that last succeeded for an operation is tried first while
/// its cache entry is fresh; otherwise candidates run in priority order
/// (`High` first, ties keep the caller's order). Every candidate goes
/// through [`ResilientExecutor::execute`] under the operation name, so all
/// candidates of an operation share one circuit and one deadline.
///
/// When every candidate fails and more than half of the failures are client
/// errors, the request itself is the likely problem rather than an outage:
/// the call degrades to `T::default()` with a warning instead of failing.
#[derive(Debug)]
pub struct EndpointFallbackResolver<C: Clock = SystemClock> {
    executor: Arc<ResilientExecutor<C>>,
    cache: EndpointCache<C>,
    reliability: ReliabilityTracker<C>,
}

impl<C: Clock> EndpointFallbackResolver<C> {
    /// Resolver sharing `executor`'s clock, with entries cached for `cache_ttl`
    pub fn new(executor: Arc<ResilientExecutor<C>>, cache_ttl: Duration) -> Self {
        let clock = Arc::clone(executor.clock());
        Self {
            cache: EndpointCache::with_clock(cache_ttl, Arc::clone(&clock)),
            reliability: ReliabilityTracker::with_clock(clock),
            executor,
        }
    }

    pub fn from_config(executor: Arc<ResilientExecutor<C>>, config: &ResilienceConfig) -> Self {
        Self::new(executor, config.endpoint_cache_ttl())
    }

    /// Run `candidates` for `operation` until one succeeds
    ///
    /// # Errors
    /// - [`FallbackError::NoCandidates`] for an empty list
    /// - [`FallbackError::Exhausted`] when every candidate failed and the
    ///   failures do not qualify for degradation
    /// - [`FallbackError::CircuitOpen`] when the operation's circuit refuses
    ///   the call; the cached choice and reliability stats are left untouched
    pub async fn resolve<T: Default>(
        &self,
        operation: &str,
        candidates: Vec<EndpointCandidate<'_, T>>,
    ) -> Result<Resolution<T>, FallbackError> {
        self.run(operation, None, candidates).await
    }

    /// [`resolve`](Self::resolve) that stops as soon as `cancel` fires
    ///
    /// Remaining candidates are not tried; the cache is left as it was.
    pub async fn resolve_with_cancel<T: Default>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        candidates: Vec<EndpointCandidate<'_, T>>,
    ) -> Result<Resolution<T>, FallbackError> {
        self.run(operation, Some(cancel), candidates).await
    }

    #[instrument(skip_all, fields(operation = %operation, candidates = candidates.len()))]
    async fn run<T: Default>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        candidates: Vec<EndpointCandidate<'_, T>>,
    ) -> Result<Resolution<T>, FallbackError> {
        if candidates.is_empty() {
            return Err(FallbackError::NoCandidates { operation: operation.to_string() });
        }

        let (ordered, promoted) = self.order(operation, candidates);
        let mut attempted: Vec<CandidateFailure> = Vec::with_capacity(ordered.len());

        for (index, mut candidate) in ordered.into_iter().enumerate() {
            let from_cache = promoted && index == 0;
            debug!(candidate = %candidate.name(), from_cache, "Trying endpoint candidate");

            let outcome = match cancel {
                Some(token) => {
                    self.executor
                        .execute_with_cancel(operation, token, || candidate.call())
                        .await
                }
                None => self.executor.execute(operation, || candidate.call()).await,
            };

            match outcome {
                Ok(value) => {
                    self.cache.record_success(operation, candidate.name());
                    self.reliability.record_success(candidate.name());
                    self.notify(operation, candidate.name(), CandidateOutcome::Succeeded);
                    if !attempted.is_empty() {
                        info!(
                            candidate = %candidate.name(),
                            failed_before = attempted.len(),
                            "Fallback candidate succeeded"
                        );
                    }
                    return Ok(Resolution::Resolved {
                        value,
                        candidate: candidate.name,
                        shape: candidate.shape,
                        from_cache,
                        attempted,
                    });
                }
                Err(Failure::Cancelled) => {
                    debug!(candidate = %candidate.name(), "Fallback cancelled");
                    return Err(FallbackError::Cancelled {
                        operation: operation.to_string(),
                        attempted,
                    });
                }
                Err(Failure::CircuitOpen { retry_in, .. }) => {
                    warn!(
                        candidate = %candidate.name(),
                        retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                        "Circuit open, endpoint fallback stopped"
                    );
                    return Err(FallbackError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_in,
                        attempted,
                    });
                }
                Err(failure) => {
                    if from_cache && self.cache.invalidate(operation) {
                        warn!(candidate = %candidate.name(), "Cached endpoint failed, entry dropped");
                    }
                    let entry = CandidateFailure::new(candidate.name(), failure);
                    self.reliability.record_failure(candidate.name(), &entry.code);
                    self.notify(operation, candidate.name(), CandidateOutcome::Failed(entry.kind));
                    warn!(
                        candidate = %candidate.name(),
                        kind = %entry.kind,
                        code = %entry.code,
                        "Endpoint candidate failed"
                    );
                    attempted.push(entry);
                }
            }
        }

        let client_errors = attempted.iter().filter(|entry| entry.failure.is_client_error()).count();
        if client_errors * 2 > attempted.len() {
            let warning = format!(
                "{client_errors} of {} endpoint candidates for '{operation}' rejected the request; \
                 returning an empty result",
                attempted.len()
            );
            warn!(client_errors, attempted = attempted.len(), "Degrading to empty result");
            return Ok(Resolution::Degraded { value: T::default(), warning, attempted });
        }

        error!(attempted = attempted.len(), "All endpoint candidates failed");
        Err(FallbackError::Exhausted { operation: operation.to_string(), failures: attempted })
    }

    /// Priority order with the cached candidate, if any, moved to the front
    fn order<'a, T>(
        &self,
        operation: &str,
        mut candidates: Vec<EndpointCandidate<'a, T>>,
    ) -> (Vec<EndpointCandidate<'a, T>>, bool) {
        candidates.sort_by_key(EndpointCandidate::endpoint_priority);

        let Some(cached) = self.cache.get(operation) else {
            return (candidates, false);
        };
        match candidates.iter().position(|candidate| candidate.name() == cached) {
            Some(position) => {
                let candidate = candidates.remove(position);
                candidates.insert(0, candidate);
                (candidates, true)
            }
            None => {
                debug!(cached = %cached, "Cached endpoint not among candidates");
                (candidates, false)
            }
        }
    }

    fn notify(&self, operation: &str, candidate: &str, outcome: CandidateOutcome) {
        for observer in self.executor.observers() {
            observer.on_fallback(operation, candidate, outcome);
        }
    }

    /// Candidate cached for `operation`, if fresh
    pub fn cached_candidate(&self, operation: &str) -> Option<String> {
        self.cache.get(operation)
    }

    pub fn invalidate(&self, operation: &str) -> bool {
        self.cache.invalidate(operation)
    }

    /// Drop every cached choice; returns how many were dropped
    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        info!(cleared, "Endpoint cache cleared");
        cleared
    }

    pub fn score(&self, candidate: &str) -> f64 {
        self.reliability.score(candidate)
    }

    pub fn diagnostics(&self) -> FallbackDiagnostics {
        FallbackDiagnostics {
            cache_ttl: self.cache.ttl(),
            cached: self.cache.entries(),
            reliability: self.reliability.snapshot(),
        }
    }

    /// Executor health with this resolver's diagnostics attached
    pub fn health_report(&self) -> HealthReport {
        self.executor.health_report().with_fallback(self.diagnostics())
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor<C>> {
        &self.executor
    }
}
