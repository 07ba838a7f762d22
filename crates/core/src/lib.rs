//! Core utilities for the spinning-quad demo.
//!
//! This crate provides foundational types used across the workspace:
//! - Error type and result alias
//! - Logging initialization
//! - Frame timer (drives the rotation animation)

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
