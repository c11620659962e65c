//! Core utilities shared by every layer of the quad demo.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AppConfig, GraphicsConfig, WindowConfig, DEFAULT_CONFIG_FILE};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
