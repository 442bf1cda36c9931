//! SessionStore: per-owner ordered queues with debounced durable snapshots
//!
//! All queue mutations go through the store. Each mutation marks the store
//! dirty; the snapshot writer (see `orchestrator::maintenance`) persists dirty
//! state every snapshot interval, and immediately when a session is destroyed.
//! Writes are serialized so there is never more than one writer.

use super::snapshot;
use crate::models::{OwnerId, QueueItem, Session, SessionStatus};
use chrono::{DateTime, Utc};
use mixtape_common::events::{EventBus, MixtapeEvent};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub struct SessionStore {
    sessions: Mutex<HashMap<OwnerId, Session>>,
    capacity: usize,
    snapshot_path: Option<PathBuf>,
    dirty: AtomicBool,
    flush_requested: Notify,
    write_lock: tokio::sync::Mutex<()>,
    event_bus: Option<EventBus>,
}

impl SessionStore {
    /// Store backed by the snapshot at `snapshot_path` (loaded now)
    pub async fn open(snapshot_path: impl Into<PathBuf>, capacity: usize) -> Self {
        let snapshot_path = snapshot_path.into();
        let sessions = snapshot::load(&snapshot_path).await;
        Self::with_sessions(sessions, Some(snapshot_path), capacity)
    }

    /// Store without persistence
    pub fn in_memory(capacity: usize) -> Self {
        Self::with_sessions(HashMap::new(), None, capacity)
    }

    fn with_sessions(
        sessions: HashMap<OwnerId, Session>,
        snapshot_path: Option<PathBuf>,
        capacity: usize,
    ) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            capacity,
            snapshot_path,
            dirty: AtomicBool::new(false),
            flush_requested: Notify::new(),
            write_lock: tokio::sync::Mutex::new(()),
            event_bus: None,
        }
    }

    /// Emit `SessionChanged`/`SessionsEvicted` on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerId, Session>> {
        // Every mutation is a single Vec/HashMap call; poisoning is ignored
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn request_flush(&self) {
        self.mark_dirty();
        self.flush_requested.notify_one();
    }

    fn emit_changed(&self, owner_id: OwnerId, queue_len: usize) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(MixtapeEvent::SessionChanged {
                owner_id,
                queue_len,
                timestamp: Utc::now(),
            });
        }
    }

    /// Append `item` to the owner's queue, creating the session if absent
    ///
    /// Returns `false` (queue unchanged) when the queue is already full.
    pub fn enqueue(&self, owner_id: OwnerId, item: QueueItem) -> bool {
        let now = Utc::now();
        let queue_len = {
            let mut sessions = self.lock();
            let full = sessions
                .get(&owner_id)
                .map(|s| s.queue.len() >= self.capacity)
                .unwrap_or(false);
            if full {
                debug!(owner_id, capacity = self.capacity, "Enqueue rejected, queue full");
                return false;
            }
            let session = sessions
                .entry(owner_id)
                .or_insert_with(|| Session::new(owner_id, now));
            if !session.push(item, self.capacity, now) {
                return false;
            }
            session.queue.len()
        };

        self.mark_dirty();
        debug!(owner_id, queue_len, "Enqueued item");
        self.emit_changed(owner_id, queue_len);
        true
    }

    /// Read-only view of the owner's queue (empty if no session exists)
    pub fn status(&self, owner_id: OwnerId) -> SessionStatus {
        self.lock()
            .get(&owner_id)
            .map(Session::status)
            .unwrap_or(SessionStatus {
                count: 0,
                items: Vec::new(),
            })
    }

    /// Items currently queued, in merge order
    pub fn queue(&self, owner_id: OwnerId) -> Vec<QueueItem> {
        self.lock()
            .get(&owner_id)
            .map(|s| s.queue.clone())
            .unwrap_or_default()
    }

    /// Destroy the owner's session (empties the queue)
    ///
    /// Returns the number of items discarded.
    pub fn clear(&self, owner_id: OwnerId) -> usize {
        let removed = self.lock().remove(&owner_id);
        let count = removed.map(|s| s.queue.len()).unwrap_or(0);

        self.request_flush();
        info!(owner_id, discarded = count, "Cleared session");
        self.emit_changed(owner_id, 0);
        count
    }

    /// Remove the merged items from the front of the queue after a successful job
    ///
    /// Items enqueued while the job ran stay queued; a session left empty is
    /// destroyed. Returns the remaining queue length.
    pub fn complete_merge(&self, owner_id: OwnerId, merged: &[QueueItem]) -> usize {
        let now = Utc::now();
        let remaining = {
            let mut sessions = self.lock();
            let remaining = match sessions.get_mut(&owner_id) {
                Some(session) => {
                    if session.remove_merged_prefix(merged, now) == 0 && !merged.is_empty() {
                        warn!(owner_id, "Queue changed during merge, merged items not removed");
                    }
                    session.queue.len()
                }
                None => 0,
            };
            if remaining == 0 {
                sessions.remove(&owner_id);
            }
            remaining
        };

        if remaining == 0 {
            self.request_flush();
        } else {
            self.mark_dirty();
        }
        self.emit_changed(owner_id, remaining);
        remaining
    }

    /// Remove every session idle for longer than `ttl`, skipping owners for
    /// which `is_busy` returns true. Returns the number removed.
    pub fn evict_expired<F>(&self, now: DateTime<Utc>, ttl: chrono::Duration, is_busy: F) -> usize
    where
        F: Fn(OwnerId) -> bool,
    {
        let evicted: Vec<OwnerId> = {
            let mut sessions = self.lock();
            let expired: Vec<OwnerId> = sessions
                .values()
                .filter(|s| s.is_expired(now, ttl) && !is_busy(s.owner_id))
                .map(|s| s.owner_id)
                .collect();
            for owner_id in &expired {
                sessions.remove(owner_id);
            }
            expired
        };

        if !evicted.is_empty() {
            self.request_flush();
            info!(count = evicted.len(), owners = ?evicted, "Evicted idle sessions");
            if let Some(bus) = &self.event_bus {
                bus.emit_lossy(MixtapeEvent::SessionsEvicted {
                    owner_ids: evicted.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
        evicted.len()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsaved mutations exist
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Resolves when a session was destroyed and the snapshot should be written now
    pub async fn flush_requested(&self) {
        self.flush_requested.notified().await
    }

    /// Write the snapshot if there are unsaved mutations
    ///
    /// Returns `Ok(true)` when a file was written. Concurrent callers are
    /// serialized; on failure the store stays dirty so the next call retries.
    pub async fn save_snapshot(&self) -> mixtape_common::Result<bool> {
        let Some(path) = self.snapshot_path.as_deref() else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(false);
        };

        let _writer = self.write_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let copy: BTreeMap<OwnerId, Session> = self
            .lock()
            .iter()
            .map(|(id, session)| (*id, session.clone()))
            .collect();

        match snapshot::save(path, &copy).await {
            Ok(()) => {
                debug!(path = %path.display(), sessions = copy.len(), "Wrote session snapshot");
                Ok(true)
            }
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }
}
