//! Shared utility helpers.

pub mod serde;
