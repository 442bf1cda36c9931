//! Per-owner job locks
//!
//! Lock order: the registry mutex is taken before the session store's mutex
//! (eviction holds both), never the other way round.

use crate::models::OwnerId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Registry of owners with an active merge job
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    active: Arc<Mutex<HashSet<OwnerId>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<OwnerId>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock `owner_id`, or `None` if a job already holds it
    pub fn try_lock(&self, owner_id: OwnerId) -> Option<UserLockGuard> {
        if !self.registry().insert(owner_id) {
            return None;
        }
        debug!(owner_id, "Acquired job lock");
        Some(UserLockGuard {
            owner_id,
            locks: self.clone(),
        })
    }

    pub fn is_locked(&self, owner_id: OwnerId) -> bool {
        self.registry().contains(&owner_id)
    }

    /// Number of owners with a running job
    pub fn active_count(&self) -> usize {
        self.registry().len()
    }

    /// Run `f` with the registry held, so no lock can be taken meanwhile
    pub fn with_registry<R>(&self, f: impl FnOnce(&HashSet<OwnerId>) -> R) -> R {
        let registry = self.registry();
        f(&registry)
    }
}

/// Held for a job's whole lifetime; unlocks the owner on drop
#[derive(Debug)]
pub struct UserLockGuard {
    owner_id: OwnerId,
    locks: UserLocks,
}

impl UserLockGuard {
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.locks.registry().remove(&self.owner_id);
        debug!(owner_id = self.owner_id, "Released job lock");
    }
}
