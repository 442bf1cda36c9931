//! Background maintenance: snapshot writer and idle-eviction sweep
//!
//! Both loops stop when their `CancellationToken` is cancelled. The snapshot
//! writer writes one final snapshot on the way out.

use super::Orchestrator;
use crate::session::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Persist dirty session state every `interval`, and immediately on request
pub fn spawn_snapshot_writer(
    store: Arc<SessionStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Snapshot writer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = store.flush_requested() => debug!("Immediate snapshot requested"),
            }

            if let Err(e) = store.save_snapshot().await {
                error!(error = %e, "Failed to write session snapshot");
            }
        }

        match store.save_snapshot().await {
            Ok(true) => info!("Final session snapshot written"),
            Ok(false) => debug!("Final session snapshot not needed"),
            Err(e) => error!(error = %e, "Failed to write final session snapshot"),
        }
    })
}

/// Evict sessions idle longer than `ttl` every `interval`
pub fn spawn_eviction_sweep(
    orchestrator: Orchestrator,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = interval.as_secs(),
            ttl_hours = ttl.as_secs() / 3600,
            "Eviction sweep started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = orchestrator.evict_expired(Utc::now(), ttl);
                    if evicted > 0 {
                        debug!(evicted, "Eviction sweep finished");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKind, QueueItem};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writer_flushes_on_destroy_and_on_cancel() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        let store = Arc::new(SessionStore::open(&path, 20).await);
        let cancel = CancellationToken::new();

        // Long interval: only the flush request and the final write can save
        let writer =
            spawn_snapshot_writer(Arc::clone(&store), Duration::from_secs(3600), cancel.clone());

        store.enqueue(1, QueueItem::new(ItemKind::LocalReference, "a.mp3", "a"));
        store.enqueue(2, QueueItem::new(ItemKind::LocalReference, "b.mp3", "b"));
        store.clear(1);

        let mut saved = serde_json::Value::Null;
        for _ in 0..100 {
            if let Ok(bytes) = std::fs::read(&path) {
                saved = serde_json::from_slice(&bytes).unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(saved.get("1").is_none());
        assert!(saved.get("2").is_some());

        store.enqueue(3, QueueItem::new(ItemKind::LocalReference, "c.mp3", "c"));
        cancel.cancel();
        writer.await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(saved.get("3").is_some());
    }
}
