//! Denoiser
//!
//! Spatiotemporal denoising for ray-traced frame sequences: a joint
//! bilateral spatial filter followed by temporal reprojection and
//! exponential moving-average accumulation over a persistent per-pixel
//! history.

#[macro_use]
extern crate log;

mod accumulation;
mod pipeline;
mod reprojection;
mod spatial;

// Re-export.
pub use accumulation::*;
pub use pipeline::*;
pub use reprojection::*;
pub use spatial::*;

#[cfg(test)]
pub(crate) mod testutil;
