//! Deduplication of runs that share a key.

use benchline_core::change::ChangeEvent;
use benchline_core::run::{DedupKey, JobRun, JobRunSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Result of admitting a run.
#[derive(Debug)]
pub struct Admission {
    /// The newly admitted run, in state `Pending`.
    pub run: JobRun,
    /// The run it replaced, now `Cancelled`.
    pub superseded: Option<JobRun>,
}

/// Keeps at most one active run per [`DedupKey`].
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    workflow: String,
    active: Arc<RwLock<HashMap<DedupKey, JobRun>>>,
}

impl ConcurrencyController {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn dedup_key(&self, event: &ChangeEvent) -> DedupKey {
        DedupKey::derive(&self.workflow, event)
    }

    /// Create a run for `event` and admit it.
    pub async fn admit(&self, event: &ChangeEvent) -> Admission {
        self.admit_or_supersede(JobRun::new(self.dedup_key(event))).await
    }

    /// Make `run` the active run for its key, cancelling whatever held the
    /// key before.
    pub async fn admit_or_supersede(&self, run: JobRun) -> Admission {
        let mut active = self.active.write().await;

        let superseded = active
            .insert(run.dedup_key().clone(), run.clone())
            .filter(|previous| previous.cancel());

        if let Some(previous) = &superseded {
            info!(
                dedup_key = %run.dedup_key(),
                cancelled = %previous.id(),
                run_id = %run.id(),
                "Superseded in-progress run"
            );
        } else {
            debug!(dedup_key = %run.dedup_key(), run_id = %run.id(), "Admitted run");
        }

        Admission { run, superseded }
    }

    /// Free the slot held by `run`. A newer run holding the same key is left
    /// in place. Returns whether an entry was removed.
    pub async fn release(&self, run: &JobRun) -> bool {
        let mut active = self.active.write().await;
        match active.get(run.dedup_key()) {
            Some(current) if current.same_run(run) => {
                active.remove(run.dedup_key());
                debug!(dedup_key = %run.dedup_key(), run_id = %run.id(), "Released run");
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, key: &DedupKey) -> Option<JobRun> {
        self.active.read().await.get(key).cloned()
    }

    /// Snapshot of every active run, ordered by key.
    pub async fn active_runs(&self) -> Vec<JobRunSnapshot> {
        let active = self.active.read().await;
        let mut runs: Vec<_> = active.values().map(JobRun::snapshot).collect();
        runs.sort_by(|a, b| a.dedup_key.cmp(&b.dedup_key));
        runs
    }

    pub async fn len(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.active.read().await.is_empty()
    }
}
