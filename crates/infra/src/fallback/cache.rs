//! Last-known-good endpoint per operation
//!
//! An entry names the candidate that most recently succeeded for an
//! operation. Entries expire after the TTL and are purged lazily by the next
//! read. A failure of the cached candidate removes the entry at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use apiguard_common::resilience::{Clock, SystemClock};
use apiguard_common::utils::serde::duration_secs;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedEndpoint {
    candidate: String,
    cached_at: Instant,
    success_count: u64,
}

/// Diagnostic view of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedEndpointInfo {
    pub operation: String,
    pub candidate: String,
    #[serde(with = "duration_secs", rename = "age_secs")]
    pub age: Duration,
    #[serde(with = "duration_secs", rename = "ttl_secs")]
    pub ttl: Duration,
    pub success_count: u64,
}

/// TTL cache of the last successful candidate, keyed by operation name
#[derive(Debug)]
pub struct EndpointCache<C: Clock = SystemClock> {
    entries: DashMap<String, CachedEndpoint>,
    ttl: Duration,
    clock: Arc<C>,
}

impl EndpointCache<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }
}

impl<C: Clock> EndpointCache<C> {
    pub fn with_clock(ttl: Duration, clock: Arc<C>) -> Self {
        Self { entries: DashMap::new(), ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &CachedEndpoint, now: Instant) -> bool {
        now.saturating_duration_since(entry.cached_at) >= self.ttl
    }

    /// Candidate cached for `operation`, or `None` if absent or expired
    ///
    /// An expired entry is removed by this call.
    pub fn get(&self, operation: &str) -> Option<String> {
        let now = self.clock.now();
        if let Some((_, stale)) =
            self.entries.remove_if(operation, |_, entry| self.is_expired(entry, now))
        {
            debug!(
                operation = %operation,
                candidate = %stale.candidate,
                "Cached endpoint expired"
            );
            return None;
        }
        self.entries.get(operation).map(|entry| entry.candidate.clone())
    }

    /// Record a success of `candidate` for `operation`
    ///
    /// The same candidate gets its timestamp refreshed and its count bumped;
    /// a different candidate replaces the entry.
    pub fn record_success(&self, operation: &str, candidate: &str) {
        let now = self.clock.now();
        self.entries
            .entry(operation.to_string())
            .and_modify(|entry| {
                if entry.candidate == candidate {
                    entry.success_count += 1;
                } else {
                    entry.candidate = candidate.to_string();
                    entry.success_count = 1;
                }
                entry.cached_at = now;
            })
            .or_insert_with(|| CachedEndpoint {
                candidate: candidate.to_string(),
                cached_at: now,
                success_count: 1,
            });
    }

    /// Drop the entry for `operation`; returns whether one existed
    pub fn invalidate(&self, operation: &str) -> bool {
        self.entries.remove(operation).is_some()
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Live entries sorted by operation; expired ones are skipped, not purged
    pub fn entries(&self) -> Vec<CachedEndpointInfo> {
        let now = self.clock.now();
        let mut entries: Vec<CachedEndpointInfo> = self
            .entries
            .iter()
            .filter(|entry| !self.is_expired(entry.value(), now))
            .map(|entry| CachedEndpointInfo {
                operation: entry.key().clone(),
                candidate: entry.candidate.clone(),
                age: now.saturating_duration_since(entry.cached_at),
                ttl: self.ttl,
                success_count: entry.success_count,
            })
            .collect();
        entries.sort_by(|a, b| a.operation.cmp(&b.operation));
        entries
    }
}
