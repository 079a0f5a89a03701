//! Endpoint vocabulary shared by request builders and the fallback resolver

pub mod endpoint;

pub use endpoint::{EndpointPriority, ResponseShape};
