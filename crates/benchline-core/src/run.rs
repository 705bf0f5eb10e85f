//! Run lifecycle types.

use crate::change::ChangeEvent;
use crate::error::{Error, Result};
use crate::ids::RunId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Key grouping runs that supersede one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Pull requests key off the PR number so new pushes to the same PR
    /// supersede each other; everything else keys off the commit.
    pub fn derive(workflow: &str, event: &ChangeEvent) -> Self {
        match event.pr_number {
            Some(pr) => Self(format!("{workflow}-{pr}")),
            None => Self(format!("{workflow}-{}", event.commit_sha)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Cancelled,
    Building,
    Staging,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Succeeded | JobState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Cancelled => "cancelled",
            JobState::Building => "building",
            JobState::Staging => "staging",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable point-in-time view of a [`JobRun`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobRunSnapshot {
    pub id: RunId,
    pub dedup_key: DedupKey,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
}

/// Handle to a run's shared state.
///
/// Clones observe the same state, so the concurrency controller can cancel a
/// run that is executing elsewhere. Once terminal, the state never changes.
#[derive(Debug, Clone)]
pub struct JobRun {
    inner: Arc<JobRunInner>,
}

#[derive(Debug)]
struct JobRunInner {
    id: RunId,
    dedup_key: DedupKey,
    started_at: DateTime<Utc>,
    state: watch::Sender<JobState>,
}

impl JobRun {
    pub fn new(dedup_key: DedupKey) -> Self {
        let (state, _) = watch::channel(JobState::Pending);
        Self {
            inner: Arc::new(JobRunInner {
                id: RunId::new(),
                dedup_key,
                started_at: Utc::now(),
                state,
            }),
        }
    }

    pub fn id(&self) -> RunId {
        self.inner.id
    }

    pub fn dedup_key(&self) -> &DedupKey {
        &self.inner.dedup_key
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == JobState::Cancelled
    }

    /// Move to `next`. Fails if the run is already terminal; a cancelled run
    /// reports [`Error::RunCancelled`] so callers can stop cooperatively.
    pub fn transition(&self, next: JobState) -> Result<()> {
        let mut current = JobState::Pending;
        let changed = self.inner.state.send_if_modified(|state| {
            current = *state;
            if state.is_terminal() {
                return false;
            }
            *state = next;
            true
        });

        if changed {
            return Ok(());
        }
        match current {
            JobState::Cancelled => Err(Error::RunCancelled {
                reason: "superseded by a newer run".to_string(),
            }),
            from => Err(Error::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            }),
        }
    }

    /// Request cooperative cancellation. Returns false if already terminal.
    pub fn cancel(&self) -> bool {
        self.transition(JobState::Cancelled).is_ok()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.inner.state.subscribe()
    }

    /// Wait until the run reaches a terminal state.
    pub async fn finished(&self) -> JobState {
        let mut rx = self.subscribe();
        match rx.wait_for(JobState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    pub fn snapshot(&self) -> JobRunSnapshot {
        JobRunSnapshot {
            id: self.id(),
            dedup_key: self.dedup_key().clone(),
            state: self.state(),
            started_at: self.started_at(),
        }
    }

    /// Whether two handles refer to the same run.
    pub fn same_run(&self, other: &JobRun) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Final result surfaced to the invoker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunResult {
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub payload: String,
    pub duration_ms: u64,
}

/// How processing of a single change event ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The event did not match the trigger rule. Not an error.
    NotAdmitted,
    /// Superseded by a newer run with the same key. Not an error.
    Cancelled { run: JobRunSnapshot },
    Succeeded { run: JobRunSnapshot, result: RunResult },
    Failed { run: JobRunSnapshot, error: Error },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::NotAdmitted | RunOutcome::Succeeded { .. } | RunOutcome::Cancelled { .. }
        )
    }

    pub fn run(&self) -> Option<&JobRunSnapshot> {
        match self {
            RunOutcome::NotAdmitted => None,
            RunOutcome::Cancelled { run }
            | RunOutcome::Succeeded { run, .. }
            | RunOutcome::Failed { run, .. } => Some(run),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::NotAdmitted => "not_admitted",
            RunOutcome::Cancelled { .. } => "cancelled",
            RunOutcome::Succeeded { .. } => "succeeded",
            RunOutcome::Failed { error, .. } => error.kind(),
        }
    }
}
