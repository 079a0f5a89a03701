//! Per-candidate success statistics
//!
//! Counters live for the process lifetime. The score they produce is
//! reported to operators and never reorders candidates.

use std::collections::BTreeMap;
use std::sync::Arc;

use apiguard_common::resilience::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Score reported for a candidate with no recorded outcome
pub const UNSEEN_SCORE: f64 = 1.0;

/// Counters for one candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointReliability {
    pub success_count: u64,
    pub failure_count: u64,
    /// Failure code (HTTP status or failure kind) to occurrences
    pub failure_codes: BTreeMap<String, u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl EndpointReliability {
    /// `success / (success + failure)`, or [`UNSEEN_SCORE`] without history
    pub fn score(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return UNSEEN_SCORE;
        }
        self.success_count as f64 / total as f64
    }
}

/// Reliability counters of one candidate with its score, for reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateReliability {
    pub candidate: String,
    pub score: f64,
    #[serde(flatten)]
    pub stats: EndpointReliability,
}

/// Reliability counters keyed by candidate name
#[derive(Debug)]
pub struct ReliabilityTracker<C: Clock = SystemClock> {
    stats: DashMap<String, EndpointReliability>,
    clock: Arc<C>,
}

impl Default for ReliabilityTracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliabilityTracker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl<C: Clock> ReliabilityTracker<C> {
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self { stats: DashMap::new(), clock }
    }

    pub fn record_success(&self, candidate: &str) {
        let now = self.clock.utc_now();
        let mut entry = self.stats.entry(candidate.to_string()).or_default();
        entry.success_count += 1;
        entry.last_success_at = Some(now);
    }

    pub fn record_failure(&self, candidate: &str, code: &str) {
        let now = self.clock.utc_now();
        let mut entry = self.stats.entry(candidate.to_string()).or_default();
        entry.failure_count += 1;
        *entry.failure_codes.entry(code.to_string()).or_insert(0) += 1;
        entry.last_failure_at = Some(now);
    }

    pub fn score(&self, candidate: &str) -> f64 {
        self.stats.get(candidate).map_or(UNSEEN_SCORE, |stats| stats.score())
    }

    pub fn get(&self, candidate: &str) -> Option<EndpointReliability> {
        self.stats.get(candidate).map(|stats| stats.clone())
    }

    /// Every tracked candidate, sorted by name
    pub fn snapshot(&self) -> Vec<CandidateReliability> {
        let mut all: Vec<CandidateReliability> = self
            .stats
            .iter()
            .map(|entry| CandidateReliability {
                candidate: entry.key().clone(),
                score: entry.score(),
                stats: entry.value().clone(),
            })
            .collect();
        all.sort_by(|a, b| a.candidate.cmp(&b.candidate));
        all
    }
}

#[cfg(test)]
mod tests {
    use apiguard_common::resilience::MockClock;

    use super::*;

    #[test]
    fn test_unseen_candidate_scores_one() {
        let tracker = ReliabilityTracker::new();
        assert!((tracker.score("never-called") - 1.0).abs() < f64::EPSILON);
        assert!(tracker.get("never-called").is_none());
    }

    #[test]
    fn test_score_is_success_ratio() {
        let tracker = ReliabilityTracker::new();
        tracker.record_success("monitors");
        tracker.record_success("monitors");
        tracker.record_success("monitors");
        tracker.record_failure("monitors", "503");

        assert!((tracker.score("monitors") - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_codes_and_timestamps() {
        let clock = Arc::new(MockClock::new());
        let tracker = ReliabilityTracker::with_clock(Arc::clone(&clock));

        tracker.record_failure("search", "400");
        tracker.record_failure("search", "400");
        tracker.record_failure("search", "timeout");
        clock.advance_secs(5);
        tracker.record_success("search");

        let stats = tracker.get("search").expect("tracked");
        assert_eq!(stats.failure_codes["400"], 2);
        assert_eq!(stats.failure_codes["timeout"], 1);
        let failed_at = stats.last_failure_at.expect("failure timestamp");
        let succeeded_at = stats.last_success_at.expect("success timestamp");
        assert_eq!((succeeded_at - failed_at).num_seconds(), 5);
    }

    #[test]
    fn test_snapshot_sorted_with_scores() {
        let tracker = ReliabilityTracker::new();
        tracker.record_failure("b", "500");
        tracker.record_success("a");

        let snapshot = tracker.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!((snapshot[0].score - 1.0).abs() < f64::EPSILON);
        assert!(snapshot[1].score.abs() < f64::EPSILON);

        let json = serde_json::to_value(&snapshot[1]).expect("serialize");
        assert_eq!(json["failure_count"], 1);
        assert_eq!(json["failure_codes"]["500"], 1);
    }
}
