//! Source handles and their release accounting
//!
//! Every locally readable file the pipeline works with (resolved inputs and the
//! merged output) lives in its own private directory under the work area and is
//! owned by exactly one [`SourceHandle`]. Releasing the handle deletes that
//! directory. The [`ResourceLedger`] counts acquisitions and releases so leaks
//! are observable.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Counts handle acquisitions and releases across the process
#[derive(Debug, Default)]
pub struct ResourceLedger {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn record_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles acquired but not yet released
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// Directory holding every private work directory
///
/// Handles are created through the work area so they are always registered
/// with the ledger.
#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
    ledger: Arc<ResourceLedger>,
}

impl WorkArea {
    pub fn new(root: impl Into<PathBuf>, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            root: root.into(),
            ledger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Remove leftovers from a previous run and recreate the work area
    ///
    /// Only safe before any handle exists (startup).
    pub async fn reset(&self) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(path = %self.root.display(), "Removed stale work area"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Create a fresh private directory; deleted when the returned value drops
    pub fn create_dir(&self, prefix: &str) -> std::io::Result<TempDir> {
        std::fs::create_dir_all(&self.root)?;
        tempfile::Builder::new().prefix(prefix).tempdir_in(&self.root)
    }

    /// Take ownership of `dir` as a handle for `path` (a file inside `dir`)
    pub fn handle(&self, dir: TempDir, path: PathBuf) -> SourceHandle {
        self.ledger.record_acquire();
        SourceHandle {
            path,
            dir: Some(dir),
            ledger: Arc::clone(&self.ledger),
            released: false,
        }
    }
}

/// A locally readable file plus its exclusive release obligation
///
/// `release` is idempotent; a handle dropped without an explicit release is
/// released on drop (and logged, since that means a code path forgot it).
#[derive(Debug)]
pub struct SourceHandle {
    path: PathBuf,
    dir: Option<TempDir>,
    ledger: Arc<ResourceLedger>,
    released: bool,
}

impl SourceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the private copy. Only the first call has any effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %dir_path.display(), error = %e, "Failed to delete private copy");
            }
        }

        self.ledger.record_release();
        debug!(path = %self.path.display(), "Released source handle");
    }

    /// [`release`](Self::release) with the directory removal on the blocking pool
    ///
    /// The private copy is gone when this returns.
    pub async fn release_async(&mut self) {
        if self.released {
            return;
        }

        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            match tokio::task::spawn_blocking(move || dir.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(path = %dir_path.display(), error = %e, "Failed to delete private copy")
                }
                Err(e) => {
                    warn!(path = %dir_path.display(), error = %e, "Private copy cleanup task failed")
                }
            }
        }

        self.release();
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(path = %self.path.display(), "Source handle dropped without release");
            self.release();
        }
    }
}

/// Release every handle in `handles`
pub fn release_all(handles: &mut [SourceHandle]) {
    for handle in handles.iter_mut() {
        handle.release();
    }
}

/// Release every handle in `handles` without blocking the executor
pub async fn release_all_async(handles: &mut [SourceHandle]) {
    for handle in handles.iter_mut() {
        handle.release_async().await;
    }
}
