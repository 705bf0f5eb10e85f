//! Sequential execution of a single run: build, stage, dispatch.

use benchline_core::artifact::ArtifactSet;
use benchline_core::config::DispatchConfig;
use benchline_core::events::{Event, StageCompletedPayload, StageStartedPayload};
use benchline_core::ports::{BenchmarkService, EventSink, Toolchain};
use benchline_core::run::{JobRun, JobState, RunOutcome, RunResult};
use benchline_core::secrets::Credentials;
use benchline_core::{Error, Result};
use benchline_runner::{ArtifactNormalizer, BuildStage, RunDispatcher};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

/// Runs the stages of one admitted run.
///
/// Cancellation is checked at every stage boundary: each stage starts with a
/// state transition, which a superseded run refuses.
///
/// Runs share one workspace: the toolchain output directory and the staging
/// directory the benchmark service reads. A run holds the workspace from
/// Build through Run, so runs for different dedup keys take turns there
/// while admission and supersession stay concurrent.
pub struct RunPipeline {
    config: Arc<DispatchConfig>,
    workspace: Semaphore,
    build: BuildStage,
    normalizer: ArtifactNormalizer,
    dispatcher: RunDispatcher,
    sink: Arc<dyn EventSink>,
    credentials: Credentials,
}

impl RunPipeline {
    pub fn new(
        config: Arc<DispatchConfig>,
        toolchain: Arc<dyn Toolchain>,
        service: Arc<dyn BenchmarkService>,
        sink: Arc<dyn EventSink>,
        credentials: Credentials,
    ) -> Self {
        let build = BuildStage::new(toolchain, config.build.clone());
        let normalizer = ArtifactNormalizer::new(&config.artifacts);
        let dispatcher = RunDispatcher::new(
            service,
            sink.clone(),
            config.build.workspace.clone(),
            config.runner.kill_grace(),
        );
        Self {
            config,
            workspace: Semaphore::new(1),
            build,
            normalizer,
            dispatcher,
            sink,
            credentials,
        }
    }

    pub fn config(&self) -> &Arc<DispatchConfig> {
        &self.config
    }

    /// Execute `run` to a terminal state and report the outcome.
    pub async fn execute(&self, run: &JobRun) -> RunOutcome {
        let outcome = match self.stages(run).await {
            Ok(result) => match run.transition(JobState::Succeeded) {
                Ok(()) => RunOutcome::Succeeded {
                    run: run.snapshot(),
                    result,
                },
                Err(_) => RunOutcome::Cancelled { run: run.snapshot() },
            },
            Err(e) if !e.is_fatal() => RunOutcome::Cancelled { run: run.snapshot() },
            Err(e) => match run.transition(JobState::Failed) {
                Err(Error::RunCancelled { .. }) => RunOutcome::Cancelled { run: run.snapshot() },
                _ => {
                    error!(run_id = %run.id(), kind = e.kind(), error = %e, "Run failed");
                    RunOutcome::Failed {
                        run: run.snapshot(),
                        error: e,
                    }
                }
            },
        };

        if let RunOutcome::Cancelled { .. } = outcome {
            info!(run_id = %run.id(), dedup_key = %run.dedup_key(), "Run cancelled");
        }

        self.dispatcher.report(run, &outcome).await;
        outcome
    }

    async fn stages(&self, run: &JobRun) -> Result<RunResult> {
        let _workspace = self.claim_workspace(run).await?;

        let built = self
            .stage(run, JobState::Building, self.build.build(run, &self.config.build.profile))
            .await?;

        let staged = self.stage(run, JobState::Staging, self.normalize(built)).await?;

        self.stage(
            run,
            JobState::Running,
            self.dispatcher
                .run(&staged, &self.credentials, self.config.runner.timeout()),
        )
        .await
    }

    /// Wait for exclusive use of the workspace. A run superseded while
    /// waiting gives up without touching it.
    async fn claim_workspace(&self, run: &JobRun) -> Result<SemaphorePermit<'_>> {
        let permit = tokio::select! {
            permit = self.workspace.acquire() => permit
                .map_err(|_| Error::Internal("Workspace semaphore closed".to_string()))?,
            _ = run.finished() => {
                return Err(Error::RunCancelled {
                    reason: "superseded while waiting for the workspace".to_string(),
                });
            }
        };
        debug!(run_id = %run.id(), "Workspace claimed");
        Ok(permit)
    }

    async fn normalize(&self, built: ArtifactSet) -> Result<ArtifactSet> {
        let normalizer = self.normalizer.clone();
        let dest_dir = self.config.build.workspace.join(&self.config.artifacts.dest_dir);
        tokio::task::spawn_blocking(move || normalizer.normalize(&built, &dest_dir))
            .await
            .map_err(|e| Error::Internal(format!("Normalizer task failed: {}", e)))?
    }

    async fn stage<T, F>(&self, run: &JobRun, stage: JobState, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        run.transition(stage)?;
        self.publish(Event::StageStarted(StageStartedPayload {
            run_id: run.id(),
            stage,
            started_at: Utc::now(),
        }))
        .await;

        let start = Instant::now();
        let result = work.await;

        self.publish(Event::StageCompleted(StageCompletedPayload {
            run_id: run.id(),
            stage,
            success: result.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
        }))
        .await;
        result
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.sink.publish(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }
}
