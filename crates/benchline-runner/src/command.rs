//! Benchmark service driven by an external command.

use crate::process::{CaptureOptions, run_captured};
use async_trait::async_trait;
use benchline_core::ports::{BenchmarkService, ExecutionOutput, ExecutionRequest};
use benchline_core::{Error, Result};
use tokio::process::Command;
use tracing::info;

/// Environment variable pointing the command at the staged artifacts.
pub const ARTIFACT_DIR_ENV: &str = "BENCHLINE_ARTIFACT_DIR";

/// Runs a command such as `cargo codspeed run` once per benchmark run.
///
/// The token is passed in the environment variable named by the request's
/// credentials. The command's stdout becomes the result payload.
pub struct CommandBenchmarkService {
    command: Vec<String>,
    capture_lines: usize,
}

impl CommandBenchmarkService {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            capture_lines: 200,
        }
    }

    pub fn capture_lines(mut self, lines: usize) -> Self {
        self.capture_lines = lines;
        self
    }
}

#[async_trait]
impl BenchmarkService for CommandBenchmarkService {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Config("benchmark command is empty".to_string()))?;

        info!(
            program = %program,
            artifact_dir = %request.artifact_dir.display(),
            timeout_secs = request.timeout.as_secs(),
            "Starting benchmark command"
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&request.workspace)
            .env(&request.credentials.token_env, request.credentials.token.expose())
            .env(ARTIFACT_DIR_ENV, &request.artifact_dir);

        let options = CaptureOptions::new("benchmark")
            .tail_lines(self.capture_lines)
            .timeout(request.timeout)
            .kill_grace(request.kill_grace)
            .secret(request.credentials.token.clone());
        let output = run_captured(command, &options).await?;

        Ok(ExecutionOutput {
            exit_code: output.exit_code,
            payload: output.stdout,
        })
    }
}
