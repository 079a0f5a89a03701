//! Candidate endpoint descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static preference among candidate endpoints; `High` is tried first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EndpointPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// Layout of the body a candidate endpoint returns
///
/// Set when the candidate is built so response handling matches on the tag
/// instead of on the endpoint's name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Monitor search results, each wrapping a monitor item
    MonitorSearch,
    /// Plain monitor listing under `data`
    MonitorList,
    /// Alert records returned directly
    DirectAlerts,
    #[default]
    Generic,
}

impl fmt::Display for EndpointPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonitorSearch => write!(f, "monitor_search"),
            Self::MonitorList => write!(f, "monitor_list"),
            Self::DirectAlerts => write!(f, "direct_alerts"),
            Self::Generic => write!(f, "generic"),
        }
    }
}
