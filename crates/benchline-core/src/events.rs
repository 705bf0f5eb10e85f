//! Events emitted to the invoking system.

use crate::change::ChangeKind;
use crate::ids::RunId;
use crate::run::{DedupKey, JobState};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events in the Benchline system.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunQueued(RunQueuedPayload),
    RunSuperseded(RunSupersededPayload),
    StageStarted(StageStartedPayload),
    StageCompleted(StageCompletedPayload),
    RunCompleted(RunCompletedPayload),
}

impl Event {
    /// Returns the subject for this event.
    pub fn subject(&self) -> String {
        match self {
            Event::RunQueued(p) => format!("run.queued.{}", p.dedup_key),
            Event::RunSuperseded(p) => format!("run.superseded.{}", p.run_id),
            Event::StageStarted(p) => format!("run.{}.stage.{}.started", p.run_id, p.stage),
            Event::StageCompleted(p) => format!("run.{}.stage.{}.completed", p.run_id, p.stage),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunQueued(p) => p.run_id,
            Event::RunSuperseded(p) => p.run_id,
            Event::StageStarted(p) => p.run_id,
            Event::StageCompleted(p) => p.run_id,
            Event::RunCompleted(p) => p.run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunQueuedPayload {
    pub run_id: RunId,
    pub dedup_key: DedupKey,
    pub trigger: ChangeKind,
    pub git_ref: String,
    pub commit_sha: String,
    pub pr_number: Option<u64>,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunSupersededPayload {
    pub run_id: RunId,
    pub dedup_key: DedupKey,
    pub superseded_by: RunId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageStartedPayload {
    pub run_id: RunId,
    pub stage: JobState,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageCompletedPayload {
    pub run_id: RunId,
    pub stage: JobState,
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub dedup_key: DedupKey,
    pub state: JobState,
    /// Error class for failed runs.
    pub error_kind: Option<String>,
    /// Error message, or the benchmark service payload.
    pub message: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}
