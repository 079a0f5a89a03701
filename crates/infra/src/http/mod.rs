//! Single-attempt HTTP adapter

pub mod client;

pub use client::{parse_retry_after, AuthHeaderProvider, HttpAttempt, HttpAttemptBuilder, StaticHeaders};
