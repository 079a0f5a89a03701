//! Domain constants
//!
//! Defaults and permitted ranges for the resilience configuration, plus the
//! per-operation timeout multipliers applied to the base timeout.

use std::ops::RangeInclusive;

// Configuration defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Permitted ranges
pub const TIMEOUT_SECS_RANGE: RangeInclusive<u64> = 1..=300;
pub const MAX_ATTEMPTS_RANGE: RangeInclusive<u32> = 1..=10;
pub const RATE_LIMIT_DELAY_MS_RANGE: RangeInclusive<u64> = 0..=60_000;

// Retry
pub const MAX_RETRY_DELAY_SECS: u64 = 60;

// Circuit breaker
pub const MIN_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;
pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 3;

/// Operation label and multiplier of the base timeout
pub const OPERATION_TIMEOUT_MULTIPLIERS: &[(&str, f64)] = &[
    ("search", 2.0),
    ("search_results", 1.5),
    ("metrics", 1.5),
    ("dashboard", 1.0),
    ("collector", 1.0),
];
