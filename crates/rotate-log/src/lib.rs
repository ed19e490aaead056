//! Rotating, compressing log sinks
//!
//! This crate provides the output side of a process supervisor: a
//! [`RotatingWriter`] that swaps to a fresh file past a size threshold while
//! gzipping and pruning the old ones, and a [`LoggerFactory`] that turns
//! per-stream configuration into [`Sink`]s for a child's stdout and stderr.

#![warn(missing_docs)]

mod archive;
pub mod error;
pub mod factory;
pub mod options;
pub mod size;
pub mod writer;

pub use error::{Error, Result};
pub use factory::{LoggerFactory, Sink};
pub use options::{LoggerConfig, Passthrough, RotateOptions};
pub use writer::{FLUSH_DELAY, RotatingWriter};
