//! Data models for mixtape-merge
//!
//! - Queue items and per-owner sessions (persisted in the snapshot)
//! - Negotiated output quality profile (derived per job, never persisted)

pub mod quality;
pub mod queue_item;
pub mod session;

pub use quality::{ContainerFormat, QualityProfile};
pub use queue_item::{ItemKind, OwnerId, QueueItem};
pub use session::{Session, SessionStatus};
