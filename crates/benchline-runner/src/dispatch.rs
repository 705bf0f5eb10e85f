//! Run dispatch: hand staged artifacts to the benchmark service.

use benchline_core::artifact::ArtifactSet;
use benchline_core::events::{Event, RunCompletedPayload};
use benchline_core::ports::{BenchmarkService, EventSink, ExecutionRequest};
use benchline_core::run::{JobRun, JobState, RunOutcome, RunResult};
use benchline_core::secrets::Credentials;
use benchline_core::{Error, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

pub struct RunDispatcher {
    service: Arc<dyn BenchmarkService>,
    sink: Arc<dyn EventSink>,
    workspace: PathBuf,
    kill_grace: Duration,
}

impl RunDispatcher {
    pub fn new(
        service: Arc<dyn BenchmarkService>,
        sink: Arc<dyn EventSink>,
        workspace: impl Into<PathBuf>,
        kill_grace: Duration,
    ) -> Self {
        Self {
            service,
            sink,
            workspace: workspace.into(),
            kill_grace,
        }
    }

    /// Execute every staged benchmark once under `limit`.
    ///
    /// The service enforces `limit` itself and gets `kill_grace` to stop.
    /// If it has not returned by `limit + 2 * kill_grace` the call is
    /// dropped, which releases whatever the service was holding, and
    /// [`Error::Timeout`] is returned.
    pub async fn run(
        &self,
        artifacts: &ArtifactSet,
        credentials: &Credentials,
        limit: Duration,
    ) -> Result<RunResult> {
        let artifact_dir = artifacts
            .root()
            .ok_or_else(|| Error::Internal("staged artifacts do not share a directory".to_string()))?
            .to_path_buf();

        let request = ExecutionRequest {
            workspace: self.workspace.clone(),
            artifact_dir,
            credentials: credentials.clone(),
            timeout: limit,
            kill_grace: self.kill_grace,
        };

        info!(
            artifacts = artifacts.len(),
            artifact_dir = %request.artifact_dir.display(),
            timeout_secs = limit.as_secs(),
            "Dispatching benchmarks"
        );

        let start = Instant::now();
        let output = match timeout(limit + self.kill_grace * 2, self.service.execute(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(timeout_secs = limit.as_secs(), "Benchmark service did not stop after timeout");
                return Err(Error::Timeout { timeout: limit });
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let payload = credentials.mask(&output.payload);

        if !output.success() {
            warn!(exit_code = output.exit_code, duration_ms, "Benchmark run failed");
            return Err(Error::RunFailed {
                exit_code: output.exit_code,
                payload,
            });
        }

        info!(duration_ms, "Benchmark run succeeded");
        Ok(RunResult {
            state: JobState::Succeeded,
            exit_code: Some(output.exit_code),
            payload,
            duration_ms,
        })
    }

    /// Report a run's final outcome to the invoking system.
    ///
    /// Delivery failures are logged and never change the outcome.
    pub async fn report(&self, run: &JobRun, outcome: &RunOutcome) {
        let (error_kind, message, exit_code) = match outcome {
            RunOutcome::NotAdmitted => return,
            RunOutcome::Cancelled { .. } => (None, Some("superseded by a newer run".to_string()), None),
            RunOutcome::Succeeded { result, .. } => (None, Some(result.payload.clone()), result.exit_code),
            RunOutcome::Failed { error, .. } => {
                let exit_code = match error {
                    Error::Build { exit_code, .. } | Error::RunFailed { exit_code, .. } => Some(*exit_code),
                    _ => None,
                };
                (Some(error.kind().to_string()), Some(error.to_string()), exit_code)
            }
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - run.started_at()).num_milliseconds().max(0) as u64;
        let event = Event::RunCompleted(RunCompletedPayload {
            run_id: run.id(),
            dedup_key: run.dedup_key().clone(),
            state: run.state(),
            error_kind,
            message,
            exit_code,
            duration_ms,
            completed_at,
        });

        if let Err(e) = self.sink.publish(event).await {
            warn!(run_id = %run.id(), error = %e, "Failed to report run completion");
        }
    }
}
