//! Error classification shared by every apiguard crate
//!
//! Concrete error enums live next to the code that produces them (the
//! resilience primitives here, the request failure taxonomy in
//! `apiguard-domain`). What they share is a common vocabulary for deciding
//! what to do with an error:
//!
//! - **`is_retryable()`**: may the same request succeed if attempted again?
//! - **`severity()`**: how loudly should it be logged or alerted on?
//! - **`is_critical()`**: does it need an operator right now?
//! - **`retry_after()`**: a server-provided hint for when to try again
//!
//! ```rust,ignore
//! impl ErrorClassification for UpstreamError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, Self::Unavailable | Self::Throttled { .. })
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         match self {
//!             Self::Throttled { .. } => ErrorSeverity::Warning,
//!             Self::Unavailable => ErrorSeverity::Error,
//!         }
//!     }
//!
//!     fn is_critical(&self) -> bool {
//!         false
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         match self {
//!             Self::Throttled { wait } => Some(*wait),
//!             Self::Unavailable => None,
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard interface for classifying errors
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: dropped connections, request
    /// timeouts, rate limiting and generic upstream failures.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the remote side asked for a specific
    /// backoff (e.g. a `Retry-After` header).
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum SampleError {
        Throttled(Duration),
        Corrupted,
        Rejected,
    }

    impl ErrorClassification for SampleError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Throttled(_))
        }

        fn severity(&self) -> ErrorSeverity {
            match self {
                Self::Throttled(_) => ErrorSeverity::Warning,
                Self::Corrupted => ErrorSeverity::Critical,
                Self::Rejected => ErrorSeverity::Info,
            }
        }

        fn retry_after(&self) -> Option<Duration> {
            match self {
                Self::Throttled(wait) => Some(*wait),
                _ => None,
            }
        }
    }

    /// Validates `ErrorSeverity` behavior for the severity display scenario.
    ///
    /// Assertions:
    /// - Confirms `ErrorSeverity::Warning.to_string()` equals `"WARN"`.
    /// - Confirms `ErrorSeverity::Critical.to_string()` equals `"CRITICAL"`.
    #[test]
    fn test_severity_display() {
        assert_eq!(ErrorSeverity::Info.to_string(), "INFO");
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Error.to_string(), "ERROR");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    /// Tests that severities order from least to most serious
    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
    }

    /// Tests the default `is_critical` derived from severity
    #[test]
    fn test_default_is_critical() {
        assert!(SampleError::Corrupted.is_critical());
        assert!(!SampleError::Throttled(Duration::from_secs(1)).is_critical());
        assert!(!SampleError::Rejected.is_critical());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = SampleError::Throttled(Duration::from_secs(4));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(SampleError::Rejected.retry_after(), None);
    }
}
