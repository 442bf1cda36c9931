//! Per-owner session: the ordered queue of not-yet-merged sources

use super::queue_item::{OwnerId, QueueItem};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One owner's pending queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub owner_id: OwnerId,
    /// Insertion order is merge order
    pub queue: Vec<QueueItem>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Read-only view returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub count: usize,
    pub items: Vec<QueueItem>,
}

impl Session {
    pub fn new(owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            queue: Vec::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Append unless the queue already holds `capacity` items
    ///
    /// A rejected push leaves the session untouched, including `last_activity_at`.
    pub fn push(&mut self, item: QueueItem, capacity: usize, now: DateTime<Utc>) -> bool {
        if self.queue.len() >= capacity {
            return false;
        }
        self.queue.push(item);
        self.touch(now);
        true
    }

    /// Empty the queue (counts as activity)
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.queue.clear();
        self.touch(now);
    }

    /// Remove `merged` from the front of the queue if it is still there
    ///
    /// Returns the number of items removed. Items enqueued after the merge
    /// started are kept.
    pub fn remove_merged_prefix(&mut self, merged: &[QueueItem], now: DateTime<Utc>) -> usize {
        if !self.queue.starts_with(merged) {
            return 0;
        }
        self.queue.drain(..merged.len());
        self.touch(now);
        merged.len()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Idle for longer than `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.last_activity_at < now - ttl
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            count: self.queue.len(),
            items: self.queue.clone(),
        }
    }
}
