//! Orchestrator: per-owner mutual exclusion and end-to-end job sequencing
//!
//! `run_merge` checks preconditions synchronously (`InsufficientItems` before
//! the lock, `AlreadyInProgress` when the lock is taken), then spawns the job:
//!
//! ```text
//! Idle → Resolving → Analyzing → Merging → Finalizing → Completed
//!            └───────────┴───────────┴──────────┴──────→ Failed
//! ```
//!
//! The job owns the owner's lock guard and every handle it acquires. Both are
//! released on every exit path, including a panic inside a stage, and before
//! the terminal event is sent.

pub mod job;
pub mod locks;
pub mod maintenance;
pub mod sink;

pub use job::{JobEvent, JobSummary, MergeJob, StateTransition};
pub use locks::{UserLockGuard, UserLocks};
pub use sink::{DeliveredOutput, OutboxSink, OutputSink};

use crate::deadline::Deadline;
use crate::error::{MergeError, MergeResult};
use crate::models::OwnerId;
use crate::quality::QualityAnalyzer;
use crate::session::SessionStore;
use crate::source::SourceResolver;
use crate::transcode::{MergeProgress, MergeRequest, Transcoder};
use chrono::{DateTime, Utc};
use mixtape_common::events::{EventBus, JobState, MixtapeEvent};
use mixtape_common::human_time::format_elapsed;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Capacity of a job's event channel; state and terminal events always fit
const JOB_EVENT_CAPACITY: usize = 64;

/// Capacity of the transcoder → orchestrator progress channel
const PROGRESS_CAPACITY: usize = 16;

/// A started merge job
pub struct MergeRun {
    pub job_id: Uuid,
    /// Job events in order; ends after the terminal event
    pub events: mpsc::Receiver<JobEvent>,
    /// Resolves with the job's outcome
    pub handle: JoinHandle<MergeResult<JobSummary>>,
}

/// Coordinates sessions, resolution, analysis and merging
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<SessionStore>,
    resolver: Arc<SourceResolver>,
    analyzer: Arc<QualityAnalyzer>,
    transcoder: Arc<dyn Transcoder>,
    locks: UserLocks,
    event_bus: EventBus,
    merge_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        resolver: Arc<SourceResolver>,
        analyzer: Arc<QualityAnalyzer>,
        transcoder: Arc<dyn Transcoder>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            resolver,
            analyzer,
            transcoder,
            locks: UserLocks::new(),
            event_bus,
            merge_timeout: None,
        }
    }

    /// Fail jobs that run longer than `timeout` with `Timeout`
    pub fn with_merge_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.merge_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Owners with a running job
    pub fn active_jobs(&self) -> usize {
        self.locks.active_count()
    }

    /// Evict idle sessions, never touching an owner with a running job
    ///
    /// The lock registry stays held for the whole sweep, so no job can start
    /// for an owner between the busy check and the removal.
    pub fn evict_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        self.locks.with_registry(|busy| {
            self.store
                .evict_expired(now, ttl, |owner_id| busy.contains(&owner_id))
        })
    }

    /// Start a merge of the owner's queue
    ///
    /// Errors (returned before any job exists): `InsufficientItems` when fewer
    /// than two items are queued, `AlreadyInProgress` when the owner already has
    /// a running job. Everything else is reported on the job's event stream.
    pub fn run_merge(&self, owner_id: OwnerId, sink: Arc<dyn OutputSink>) -> MergeResult<MergeRun> {
        let queued = self.store.status(owner_id).count;
        if queued < 2 {
            return Err(MergeError::InsufficientItems { count: queued });
        }

        let guard = self
            .locks
            .try_lock(owner_id)
            .ok_or(MergeError::AlreadyInProgress { owner_id })?;

        // Re-read under the lock; a clear may have raced the check above
        let items = self.store.queue(owner_id);
        if items.len() < 2 {
            return Err(MergeError::InsufficientItems { count: items.len() });
        }

        let job = MergeJob::new(owner_id, items);
        let job_id = job.job_id;
        let (tx, rx) = mpsc::channel(JOB_EVENT_CAPACITY);

        info!(job_id = %job_id, owner_id, inputs = job.items.len(), "Starting merge job");
        self.event_bus.emit_lossy(MixtapeEvent::JobStarted {
            job_id,
            owner_id,
            inputs: job.items.len(),
            timestamp: Utc::now(),
        });

        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.execute(job, guard, sink, tx).await });

        Ok(MergeRun {
            job_id,
            events: rx,
            handle,
        })
    }

    async fn execute(
        &self,
        mut job: MergeJob,
        guard: UserLockGuard,
        sink: Arc<dyn OutputSink>,
        tx: mpsc::Sender<JobEvent>,
    ) -> MergeResult<JobSummary> {
        let deadline = self.merge_timeout.map(Deadline::after);

        match self.drive(&mut job, sink.as_ref(), &tx, deadline).await {
            Ok(summary) => {
                job.release_handles().await;
                drop(guard);
                self.set_state(&mut job, JobState::Completed, &tx).await;
                info!(
                    job_id = %job.job_id,
                    owner_id = job.owner_id,
                    output = %summary.output_name,
                    elapsed = %format_elapsed(Duration::from_millis(summary.elapsed_ms)),
                    "Merge job completed"
                );
                self.event_bus.emit_lossy(MixtapeEvent::JobCompleted {
                    job_id: job.job_id,
                    owner_id: job.owner_id,
                    output_name: summary.output_name.clone(),
                    elapsed_ms: summary.elapsed_ms,
                    timestamp: Utc::now(),
                });
                let _ = tx.send(JobEvent::Completed(summary.clone())).await;
                Ok(summary)
            }
            Err(e) => {
                let failed_in = job.state();
                job.release_handles().await;
                drop(guard);
                self.set_state(&mut job, JobState::Failed, &tx).await;
                error!(
                    job_id = %job.job_id,
                    owner_id = job.owner_id,
                    stage = %failed_in,
                    category = e.category(),
                    error = %e,
                    "Merge job failed"
                );
                self.event_bus.emit_lossy(MixtapeEvent::JobFailed {
                    job_id: job.job_id,
                    owner_id: job.owner_id,
                    category: e.category().to_string(),
                    message: e.user_message(),
                    timestamp: Utc::now(),
                });
                let _ = tx
                    .send(JobEvent::Failed {
                        job_id: job.job_id,
                        category: e.category().to_string(),
                        message: e.user_message(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut MergeJob,
        sink: &dyn OutputSink,
        tx: &mpsc::Sender<JobEvent>,
        deadline: Option<Deadline>,
    ) -> MergeResult<JobSummary> {
        self.set_state(job, JobState::Resolving, tx).await;
        let items = job.items.clone();
        for item in &items {
            let handle = bounded(deadline, self.resolver.acquire(item)).await?;
            job.inputs.push(handle);
        }

        self.set_state(job, JobState::Analyzing, tx).await;
        let paths: Vec<PathBuf> = job.inputs.iter().map(|h| h.path().to_path_buf()).collect();
        let path_refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let analysis = bounded(deadline, async { Ok(self.analyzer.analyze(&path_refs).await) }).await?;
        info!(
            job_id = %job.job_id,
            lossless = analysis.profile.lossless,
            sample_rate = analysis.profile.sample_rate,
            channels = analysis.profile.channels,
            bitrate_kbps = ?analysis.profile.bitrate_kbps,
            container = analysis.profile.container.extension(),
            "Negotiated output profile"
        );
        job.profile = Some(analysis.profile.clone());

        self.set_state(job, JobState::Merging, tx).await;
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CAPACITY);
        let relay = tokio::spawn(relay_progress(
            job.job_id,
            job.owner_id,
            progress_rx,
            tx.clone(),
            self.event_bus.clone(),
        ));
        let request = MergeRequest {
            inputs: paths,
            profile: analysis.profile.clone(),
            total_duration: analysis.total_duration,
            deadline,
        };
        let merged = bounded(deadline, self.transcoder.merge(request, progress_tx)).await;
        let _ = relay.await;
        job.output = Some(merged?);

        self.set_state(job, JobState::Finalizing, tx).await;
        let output_path = job
            .output
            .as_ref()
            .map(|h| h.path().to_path_buf())
            .ok_or_else(|| MergeError::TranscodeFailure("output handle missing".to_string()))?;
        let delivered = bounded(
            deadline,
            sink.deliver(job.job_id, job.owner_id, &output_path, &analysis.profile),
        )
        .await?;

        self.store.complete_merge(job.owner_id, &job.items);

        Ok(JobSummary {
            job_id: job.job_id,
            owner_id: job.owner_id,
            inputs: job.inputs.len(),
            profile: analysis.profile,
            output_name: delivered.name,
            location: delivered.location,
            elapsed_ms: job.elapsed_ms(),
        })
    }

    async fn set_state(&self, job: &mut MergeJob, state: JobState, tx: &mpsc::Sender<JobEvent>) {
        let transition = job.transition_to(state);
        self.event_bus.emit_lossy(MixtapeEvent::JobStateChanged {
            job_id: job.job_id,
            owner_id: job.owner_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
        let _ = tx
            .send(JobEvent::StateChanged {
                job_id: job.job_id,
                state,
            })
            .await;
    }
}

/// Await `fut`, failing with `Timeout` once `deadline` passes
async fn bounded<T, F>(deadline: Option<Deadline>, fut: F) -> MergeResult<T>
where
    F: Future<Output = MergeResult<T>>,
{
    match deadline {
        Some(deadline) => deadline
            .run(fut)
            .await
            .map_err(|expired| MergeError::Timeout(expired.budget))?,
        None => fut.await,
    }
}

async fn relay_progress(
    job_id: Uuid,
    owner_id: OwnerId,
    mut progress_rx: mpsc::Receiver<MergeProgress>,
    tx: mpsc::Sender<JobEvent>,
    event_bus: EventBus,
) {
    while let Some(progress) = progress_rx.recv().await {
        let elapsed_ms = progress.elapsed.as_millis() as u64;
        let _ = tx.try_send(JobEvent::Progress {
            job_id,
            percent: progress.percent,
            elapsed_ms,
        });
        event_bus.emit_lossy(MixtapeEvent::JobProgress {
            job_id,
            owner_id,
            percent: progress.percent,
            elapsed_ms,
            timestamp: Utc::now(),
        });
    }
}
