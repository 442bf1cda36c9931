//! Event types for the mixtape event system
//!
//! Provides shared event definitions and the EventBus used for SSE broadcasting.

mod job_types;

pub use job_types::JobState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Service-wide events
///
/// Broadcast via [`EventBus`] and serialized for the global SSE stream.
/// Per-job progress for the requesting user travels on the job's own stream;
/// these events are the observational copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MixtapeEvent {
    /// A session queue changed (enqueue, clear, completion)
    SessionChanged {
        owner_id: i64,
        /// Queue length after the change
        queue_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// Idle sessions removed by the eviction sweep
    SessionsEvicted {
        owner_ids: Vec<i64>,
        timestamp: DateTime<Utc>,
    },

    /// A merge job acquired the owner's lock
    JobStarted {
        job_id: Uuid,
        owner_id: i64,
        /// Number of queued items being merged
        inputs: usize,
        timestamp: DateTime<Utc>,
    },

    /// A merge job moved between states
    JobStateChanged {
        job_id: Uuid,
        owner_id: i64,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },

    /// Transcoder progress (observational only)
    JobProgress {
        job_id: Uuid,
        owner_id: i64,
        /// Percent complete, when the total input duration is known
        percent: Option<f32>,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Output delivered and job completed
    JobCompleted {
        job_id: Uuid,
        owner_id: i64,
        output_name: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Job aborted
    JobFailed {
        job_id: Uuid,
        owner_id: i64,
        /// Stable error category code
        category: String,
        /// User-visible message (no internal diagnostics)
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl MixtapeEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            MixtapeEvent::SessionChanged { .. } => "SessionChanged",
            MixtapeEvent::SessionsEvicted { .. } => "SessionsEvicted",
            MixtapeEvent::JobStarted { .. } => "JobStarted",
            MixtapeEvent::JobStateChanged { .. } => "JobStateChanged",
            MixtapeEvent::JobProgress { .. } => "JobProgress",
            MixtapeEvent::JobCompleted { .. } => "JobCompleted",
            MixtapeEvent::JobFailed { .. } => "JobFailed",
        }
    }

    /// Whether this event is about `owner`'s session or jobs
    pub fn concerns_owner(&self, owner: i64) -> bool {
        match self {
            MixtapeEvent::SessionsEvicted { owner_ids, .. } => owner_ids.contains(&owner),
            MixtapeEvent::SessionChanged { owner_id, .. }
            | MixtapeEvent::JobStarted { owner_id, .. }
            | MixtapeEvent::JobStateChanged { owner_id, .. }
            | MixtapeEvent::JobProgress { owner_id, .. }
            | MixtapeEvent::JobCompleted { owner_id, .. }
            | MixtapeEvent::JobFailed { owner_id, .. } => *owner_id == owner,
        }
    }
}

/// Broadcast bus for [`MixtapeEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MixtapeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MixtapeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MixtapeEvent,
    ) -> Result<usize, broadcast::error::SendError<MixtapeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MixtapeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(MixtapeEvent::SessionChanged {
            owner_id: 7,
            queue_len: 3,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            MixtapeEvent::SessionChanged { owner_id, queue_len, .. } => {
                assert_eq!(owner_id, 7);
                assert_eq!(queue_len, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = MixtapeEvent::SessionsEvicted {
            owner_ids: vec![1],
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy variant never fails
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = MixtapeEvent::JobFailed {
            job_id: Uuid::nil(),
            owner_id: 1,
            category: "TRANSCODE_FAILURE".to_string(),
            message: "processing error".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobFailed");
        assert_eq!(json["category"], "TRANSCODE_FAILURE");
        assert_eq!(event.event_type(), "JobFailed");
    }

    #[test]
    fn test_concerns_owner() {
        let changed = MixtapeEvent::SessionChanged {
            owner_id: 7,
            queue_len: 1,
            timestamp: Utc::now(),
        };
        assert!(changed.concerns_owner(7));
        assert!(!changed.concerns_owner(8));

        let evicted = MixtapeEvent::SessionsEvicted {
            owner_ids: vec![1, 2],
            timestamp: Utc::now(),
        };
        assert!(evicted.concerns_owner(2));
        assert!(!evicted.concerns_owner(3));
    }
}
