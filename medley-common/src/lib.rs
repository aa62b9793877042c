//! Medley Common - Shared types for the Medley workspace.
//!
//! This crate provides:
//! - Configuration loading from the environment
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, TranscriptPolicy};
pub use error::{ChatError, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, TranscriptPolicy};
    pub use crate::error::{ChatError, Result, ResultExt};
    pub use crate::logging::init_logging;
}
