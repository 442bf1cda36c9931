//! Output delivery to the caller
//!
//! The merged file lives in a private work directory that is deleted when the
//! job releases its output handle, so a sink must copy or upload it before
//! `deliver` returns.

use crate::error::{MergeError, MergeResult};
use crate::models::{OwnerId, QualityProfile};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Where a delivered output ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredOutput {
    pub name: String,
    pub location: String,
}

/// Receives the finished output during `Finalizing`
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn deliver(
        &self,
        job_id: Uuid,
        owner_id: OwnerId,
        output: &Path,
        profile: &QualityProfile,
    ) -> MergeResult<DeliveredOutput>;
}

/// Copies outputs into a directory served at `url_prefix`
#[derive(Debug, Clone)]
pub struct OutboxSink {
    dir: PathBuf,
    url_prefix: String,
}

impl OutboxSink {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl OutputSink for OutboxSink {
    async fn deliver(
        &self,
        job_id: Uuid,
        owner_id: OwnerId,
        output: &Path,
        profile: &QualityProfile,
    ) -> MergeResult<DeliveredOutput> {
        let name = format!("{}.{}", job_id, profile.container.extension());
        let target = self.dir.join(&name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MergeError::Delivery(format!("{}: {}", self.dir.display(), e)))?;

        if let Err(e) = tokio::fs::copy(output, &target).await {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(MergeError::Delivery(format!("{}: {}", target.display(), e)));
        }

        info!(job_id = %job_id, owner_id, file = %target.display(), "Delivered output to outbox");
        Ok(DeliveredOutput {
            location: format!("{}/{}", self.url_prefix, name),
            name,
        })
    }
}
