//! Merge job model and the per-job event stream

use crate::models::{OwnerId, QualityProfile, QueueItem};
use crate::source::{release_all, release_all_async, SourceHandle};
use chrono::{DateTime, Utc};
use mixtape_common::events::JobState;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Recorded state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// One end-to-end acquisition, analysis, transcode and cleanup unit of work
///
/// Owns every handle it acquires. Dropping a job releases whatever it still
/// holds, so a panicking stage cannot leak private copies.
#[derive(Debug)]
pub struct MergeJob {
    pub job_id: Uuid,
    pub owner_id: OwnerId,
    /// Queue snapshot taken when the job started
    pub items: Vec<QueueItem>,
    /// Acquired inputs, in queue order
    pub inputs: Vec<SourceHandle>,
    pub profile: Option<QualityProfile>,
    pub output: Option<SourceHandle>,
    state: JobState,
    transitions: Vec<StateTransition>,
    started: Instant,
}

impl MergeJob {
    pub fn new(owner_id: OwnerId, items: Vec<QueueItem>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            owner_id,
            items,
            inputs: Vec::new(),
            profile: None,
            output: None,
            state: JobState::Idle,
            transitions: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `new_state`, recording the transition
    ///
    /// Illegal transitions are logged and still applied; the orchestrator only
    /// requests legal ones.
    pub fn transition_to(&mut self, new_state: JobState) -> StateTransition {
        if !self.state.can_transition_to(new_state) {
            warn!(
                job_id = %self.job_id,
                from = %self.state,
                to = %new_state,
                "Unexpected job state transition"
            );
        }

        let transition = StateTransition {
            job_id: self.job_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        self.transitions.push(transition.clone());

        debug!(
            job_id = %self.job_id,
            owner_id = self.owner_id,
            from = %transition.old_state,
            to = %new_state,
            "Job state changed"
        );
        transition
    }

    /// Release every input and the output (idempotent)
    pub async fn release_handles(&mut self) {
        release_all_async(&mut self.inputs).await;
        if let Some(output) = self.output.as_mut() {
            output.release_async().await;
        }
    }
}

impl Drop for MergeJob {
    fn drop(&mut self) {
        release_all(&mut self.inputs);
        if let Some(output) = self.output.as_mut() {
            output.release();
        }
    }
}

/// Result of a completed job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub owner_id: OwnerId,
    /// Number of merged inputs
    pub inputs: usize,
    pub profile: QualityProfile,
    /// Name of the delivered output
    pub output_name: String,
    /// Where the caller can fetch the output
    pub location: String,
    pub elapsed_ms: u64,
}

/// Event on a job's own stream, as relayed to the requesting owner
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    StateChanged {
        job_id: Uuid,
        state: JobState,
    },
    Progress {
        job_id: Uuid,
        percent: Option<f32>,
        elapsed_ms: u64,
    },
    Completed(JobSummary),
    Failed {
        job_id: Uuid,
        category: String,
        message: String,
    },
}

impl JobEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::StateChanged { .. } => "StateChanged",
            JobEvent::Progress { .. } => "Progress",
            JobEvent::Completed(_) => "Completed",
            JobEvent::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed(_) | JobEvent::Failed { .. })
    }
}
