//! Merge job lifecycle types shared between the orchestrator and event consumers

use serde::{Deserialize, Serialize};

/// Merge job state machine
///
/// `Idle → Resolving → Analyzing → Merging → Finalizing → {Completed, Failed}`.
/// Any non-terminal state may move straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Job created, nothing acquired yet
    Idle,
    /// Turning queued references into private local files
    Resolving,
    /// Probing inputs and negotiating the output profile
    Analyzing,
    /// External transcoder running
    Merging,
    /// Delivering the output and releasing handles
    Finalizing,
    /// Output delivered, queue cleared
    Completed,
    /// Aborted; every acquired handle released, queue left intact
    Failed,
}

impl JobState {
    /// Terminal states end the job and free the owner's lock
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Idle, Resolving)
            | (Resolving, Analyzing)
            | (Analyzing, Merging)
            | (Merging, Finalizing)
            | (Finalizing, Completed) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Idle => "IDLE",
            JobState::Resolving => "RESOLVING",
            JobState::Analyzing => "ANALYZING",
            JobState::Merging => "MERGING",
            JobState::Finalizing => "FINALIZING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
