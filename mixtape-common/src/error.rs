//! Shared error type for config loading and durable files

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, unreadable or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot or event payload could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Atomic write failed before the target was replaced; the previous file is intact
    #[error("Atomic write to {path} failed: {source}")]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
