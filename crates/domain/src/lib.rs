//! # Apiguard Domain
//!
//! Vocabulary shared by everything that calls the remote API through the
//! resilience engine.
//!
//! This crate contains:
//! - The request [`Failure`] taxonomy and its classification
//! - Endpoint descriptors ([`EndpointPriority`], [`ResponseShape`])
//! - Configuration structures and derived settings
//! - Domain constants
//!
//! ## Architecture
//! - Depends only on the foundation tier of `apiguard-common`
//! - No I/O, no async runtime
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
