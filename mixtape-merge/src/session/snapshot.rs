//! Durable session snapshot (one JSON file, owner id → session)

use crate::models::{OwnerId, Session};
use mixtape_common::fs::write_atomic;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Load the snapshot at `path`
///
/// A missing or unreadable file yields an empty map; startup never fails here.
pub async fn load(path: &Path) -> HashMap<OwnerId, Session> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No session snapshot, starting empty");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read session snapshot, starting empty");
            return HashMap::new();
        }
    };

    match serde_json::from_slice::<BTreeMap<OwnerId, Session>>(&bytes) {
        Ok(map) => {
            let sessions: HashMap<OwnerId, Session> = map
                .into_iter()
                .map(|(owner_id, mut session)| {
                    session.owner_id = owner_id;
                    (owner_id, session)
                })
                .collect();
            info!(path = %path.display(), sessions = sessions.len(), "Loaded session snapshot");
            sessions
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt session snapshot, starting empty");
            HashMap::new()
        }
    }
}

/// Atomically replace the snapshot at `path`
pub async fn save(path: &Path, sessions: &BTreeMap<OwnerId, Session>) -> mixtape_common::Result<()> {
    let json = serde_json::to_vec_pretty(sessions)?;
    write_atomic(path, &json).await
}
