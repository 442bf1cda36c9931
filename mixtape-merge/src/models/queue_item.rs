//! Queued source references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner (user) identifier assigned by the messaging platform
pub type OwnerId = i64;

/// What the collaborator says the reference is
///
/// This is a hint from the inbound event. The resolver still applies its own
/// classification rule to `LocalReference` and `RemoteUrl` content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// File path or local-storage URL (e.g. an uploaded attachment)
    LocalReference,
    /// http(s) URL found in a text message
    RemoteUrl,
    /// Platform file token that must be looked up before use
    OpaqueToken,
}

/// One queued source. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub kind: ItemKind,
    /// The reference itself (path, URL or token)
    pub content: String,
    /// Display label (file name, title)
    pub label: String,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(kind: ItemKind, content: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            label: label.into(),
            enqueued_at: Utc::now(),
        }
    }
}
