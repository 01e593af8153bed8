//! Common types and numeric helpers used throughout the denoiser.

mod common;

// Re-export.
pub use common::*;
