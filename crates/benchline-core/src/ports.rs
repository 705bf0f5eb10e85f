//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and the
//! external collaborators: the toolchain, the benchmark service and the
//! invoking system that receives run events.

use crate::artifact::ArtifactSet;
use crate::config::BuildProfile;
use crate::events::Event;
use crate::secrets::Credentials;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Input to a toolchain build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub package: String,
    pub targets: Vec<String>,
    pub profile: BuildProfile,
    pub workspace: PathBuf,
    /// Where the toolchain is expected to leave bench binaries.
    pub output_dir: PathBuf,
    pub capture_lines: usize,
}

/// What a toolchain build produced.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub exit_code: i32,
    pub output_dir: PathBuf,
    /// Bench executable this build produced (or found up to date) for each
    /// target it built. Older files in `output_dir` are never listed.
    pub artifacts: ArtifactSet,
    /// Trailing merged stdout/stderr.
    pub captured_output: String,
}

/// Compiler/toolchain collaborator.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Build the requested targets. A non-zero exit is reported through
    /// `BuildOutput::exit_code`, not as an error.
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutput>;
}

/// Input to the benchmark service.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub workspace: PathBuf,
    pub artifact_dir: PathBuf,
    pub credentials: Credentials,
    pub timeout: Duration,
    /// How long in-flight work may take to stop once `timeout` elapses.
    pub kill_grace: Duration,
}

/// Result reported by the benchmark service.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub payload: String,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// External benchmark-execution collaborator.
#[async_trait]
pub trait BenchmarkService: Send + Sync {
    /// Execute every staged benchmark once. Implementations must stop and
    /// reclaim any in-flight work once `request.timeout` elapses, returning
    /// [`crate::Error::Timeout`].
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput>;
}

/// Receiver for run events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;
}
