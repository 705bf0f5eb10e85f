//! Main scheduler orchestration.

use crate::concurrency::ConcurrencyController;
use crate::pipeline::RunPipeline;
use crate::triggers::TriggerMatcher;

use benchline_core::Error;
use benchline_core::change::ChangeEvent;
use benchline_core::config::DispatchConfig;
use benchline_core::events::{Event, RunQueuedPayload, RunSupersededPayload};
use benchline_core::ports::EventSink;
use benchline_core::run::{JobRun, JobState, RunOutcome};
use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// An admitted run executing on its own task.
#[derive(Debug)]
pub struct ScheduledRun {
    pub run: JobRun,
    handle: JoinHandle<RunOutcome>,
    controller: ConcurrencyController,
}

impl ScheduledRun {
    /// Wait for the run to finish.
    pub async fn outcome(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The task never reached its own release.
                self.controller.release(&self.run).await;
                fail_run(&self.run, format!("Run task failed: {}", e))
            }
        }
    }
}

fn fail_run(run: &JobRun, message: String) -> RunOutcome {
    error!(run_id = %run.id(), error = %message, "Run aborted");
    if run.transition(JobState::Failed).is_err() && run.is_cancelled() {
        return RunOutcome::Cancelled { run: run.snapshot() };
    }
    RunOutcome::Failed {
        run: run.snapshot(),
        error: Error::Internal(message),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Admits change events and runs them, one task per run.
pub struct Scheduler {
    config: Arc<DispatchConfig>,
    trigger_matcher: TriggerMatcher,
    controller: ConcurrencyController,
    pipeline: Arc<RunPipeline>,
    sink: Arc<dyn EventSink>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<RunPipeline>, sink: Arc<dyn EventSink>) -> Self {
        let config = pipeline.config().clone();
        Self {
            trigger_matcher: TriggerMatcher::new(),
            controller: ConcurrencyController::new(config.workflow.clone()),
            config,
            pipeline,
            sink,
        }
    }

    pub fn controller(&self) -> &ConcurrencyController {
        &self.controller
    }

    /// Evaluate `event` and, if it matches, admit a new run for it.
    pub async fn admit(&self, event: &ChangeEvent) -> Option<JobRun> {
        if !self.trigger_matcher.admit(event, &self.config.trigger) {
            info!(
                kind = %event.kind,
                git_ref = %event.git_ref,
                commit_sha = %event.commit_sha,
                "Event not admitted"
            );
            return None;
        }

        let admission = self.controller.admit(event).await;
        let run = admission.run;

        if let Some(previous) = admission.superseded {
            self.publish(Event::RunSuperseded(RunSupersededPayload {
                run_id: previous.id(),
                dedup_key: previous.dedup_key().clone(),
                superseded_by: run.id(),
                cancelled_at: Utc::now(),
            }))
            .await;
        }

        info!(
            run_id = %run.id(),
            dedup_key = %run.dedup_key(),
            kind = %event.kind,
            "Run queued"
        );
        self.publish(Event::RunQueued(RunQueuedPayload {
            run_id: run.id(),
            dedup_key: run.dedup_key().clone(),
            trigger: event.kind,
            git_ref: event.git_ref.clone(),
            commit_sha: event.commit_sha.clone(),
            pr_number: event.pr_number,
            queued_at: Utc::now(),
        }))
        .await;

        Some(run)
    }

    /// Execute an admitted run on its own task, releasing its slot when done.
    pub fn spawn(&self, run: JobRun) -> ScheduledRun {
        let pipeline = self.pipeline.clone();
        let controller = self.controller.clone();
        let task_run = run.clone();

        let task_controller = controller.clone();
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(pipeline.execute(&task_run))
                .catch_unwind()
                .await;
            task_controller.release(&task_run).await;
            match outcome {
                Ok(outcome) => outcome,
                Err(panic) => fail_run(
                    &task_run,
                    format!("Run task panicked: {}", panic_message(&*panic)),
                ),
            }
        });

        ScheduledRun {
            run,
            handle,
            controller,
        }
    }

    /// Admit and start `event` without waiting for it.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Option<ScheduledRun> {
        let run = self.admit(event).await?;
        Some(self.spawn(run))
    }

    /// Process a single event to completion.
    pub async fn process(&self, event: &ChangeEvent) -> RunOutcome {
        match self.handle_event(event).await {
            Some(scheduled) => scheduled.outcome().await,
            None => RunOutcome::NotAdmitted,
        }
    }

    /// Admit events in delivery order, then wait for every run.
    ///
    /// Outcomes are returned in the order of `events`. A later event with
    /// the same key cancels an earlier one that is still running.
    pub async fn process_all<I>(&self, events: I) -> Vec<RunOutcome>
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        let mut scheduled = Vec::new();
        for event in events {
            scheduled.push(self.handle_event(&event).await);
        }

        join_all(scheduled.into_iter().map(|run| async move {
            match run {
                Some(run) => run.outcome().await,
                None => RunOutcome::NotAdmitted,
            }
        }))
        .await
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.sink.publish(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }
}
