//! # Mixtape Common Library
//!
//! Shared code for the mixtape services including:
//! - Error types
//! - Configuration file discovery and data folder resolution
//! - Atomic file writes
//! - Event types (MixtapeEvent) and the EventBus
//! - Human-readable elapsed time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod human_time;

pub use error::{Error, Result};
