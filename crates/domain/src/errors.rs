//! Failure taxonomy for outbound API calls
//!
//! Every attempt, retry sequence and fallback candidate ends in either a
//! value or a [`Failure`]. Retry, circuit and cache decisions are pure
//! matches over the variant; nothing inspects message text.

use std::fmt;
use std::time::Duration;

use apiguard_common::error::{ErrorClassification, ErrorSeverity};
use apiguard_common::utils::serde::{duration_millis, option_duration_millis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure of a single request or of a whole execution
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Failure {
    /// Connection could not be established or was dropped mid-request
    #[error("Network error: {message}")]
    Network { message: String },

    /// The attempt did not finish before its deadline
    #[error("Request timed out after {timeout:?}")]
    Timeout {
        #[serde(rename = "timeout_ms", with = "duration_millis")]
        timeout: Duration,
    },

    /// The server asked the client to back off (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited {
        #[serde(rename = "retry_after_ms", default, with = "option_duration_millis")]
        retry_after: Option<Duration>,
    },

    /// Rejected locally because the operation's circuit is open
    #[error("Circuit breaker is open for '{operation}'")]
    CircuitOpen {
        operation: String,
        #[serde(rename = "retry_in_ms", default, with = "option_duration_millis")]
        retry_in: Option<Duration>,
    },

    /// Generic server-side failure (5xx, malformed body)
    #[error("Upstream API error: {message}")]
    Upstream { status: Option<u16>, message: String },

    /// The server answered and refused the request (4xx other than 401/403/429)
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Authentication failed: {message}")]
    Auth { status: Option<u16>, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The caller abandoned the operation
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for apiguard operations
pub type Result<T> = std::result::Result<T, Failure>;

/// Tag of a [`Failure`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Timeout,
    RateLimited,
    CircuitOpen,
    Upstream,
    Rejected,
    Auth,
    Validation,
    Config,
    Cancelled,
}

impl FailureKind {
    /// Stable snake_case label, used for metric labels and failure codes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::Upstream => "upstream",
            Self::Rejected => "rejected",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Config => "config",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-equivalent status class of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// 4xx: the server was reached and refused the request
    ClientError,
    /// 5xx or an unusable response body
    ServerError,
    /// No usable response: connection failure or deadline
    Transport,
    /// Decided on this side without contacting the server
    Local,
}

impl Failure {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream { status, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::CircuitOpen { .. } => FailureKind::CircuitOpen,
            Self::Upstream { .. } => FailureKind::Upstream,
            Self::Rejected { .. } => FailureKind::Rejected,
            Self::Auth { .. } => FailureKind::Auth,
            Self::Validation { .. } => FailureKind::Validation,
            Self::Config { .. } => FailureKind::Config,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// HTTP status carried by the failure, when the server sent one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Upstream { status, .. } | Self::Auth { status, .. } => *status,
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::RateLimited { .. } | Self::Rejected { .. } | Self::Auth { .. } => {
                StatusClass::ClientError
            }
            Self::Validation { .. } => StatusClass::ClientError,
            Self::Upstream { .. } => StatusClass::ServerError,
            Self::Network { .. } | Self::Timeout { .. } => StatusClass::Transport,
            Self::CircuitOpen { .. } | Self::Config { .. } | Self::Cancelled => StatusClass::Local,
        }
    }

    /// The request reached the server and was refused as malformed or
    /// unauthorised. Rate limiting is excluded: it signals load, not a bad
    /// request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Auth { .. } | Self::Validation { .. })
    }

    /// Failures that are propagated on first occurrence
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::Auth { .. } | Self::Validation { .. } | Self::Config { .. }
        )
    }

    /// Code recorded in reliability statistics: the HTTP status when there
    /// is one, the kind label otherwise
    pub fn code(&self) -> String {
        match self.status() {
            Some(status) => status.to_string(),
            None => self.kind().as_str().to_string(),
        }
    }
}

impl ErrorClassification for Failure {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimited { .. } | Self::Upstream { .. }
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            Self::RateLimited { .. }
            | Self::CircuitOpen { .. }
            | Self::Rejected { .. }
            | Self::Validation { .. } => ErrorSeverity::Warning,
            Self::Network { .. } | Self::Timeout { .. } | Self::Upstream { .. } => {
                ErrorSeverity::Error
            }
            Self::Auth { .. } | Self::Config { .. } => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::CircuitOpen { retry_in, .. } => *retry_in,
            _ => None,
        }
    }
}
