//! Core

#[macro_use]
extern crate log;

// Re-export.
pub mod app;
pub mod buffer;
pub mod frame;
pub mod geometry;
pub mod image_io;
pub mod raydn;
