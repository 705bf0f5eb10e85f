//! Build stage: compile the bench targets and check every one was produced.

use benchline_core::artifact::ArtifactSet;
use benchline_core::config::{BuildConfig, BuildProfile};
use benchline_core::ports::{BuildRequest, Toolchain};
use benchline_core::run::JobRun;
use benchline_core::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub struct BuildStage {
    toolchain: Arc<dyn Toolchain>,
    config: BuildConfig,
}

impl BuildStage {
    pub fn new(toolchain: Arc<dyn Toolchain>, config: BuildConfig) -> Self {
        Self { toolchain, config }
    }

    pub fn targets(&self) -> &[String] {
        &self.config.targets
    }

    /// Build every configured target with `profile`.
    ///
    /// Returns the executable the toolchain reported for each target. A
    /// target the toolchain did not report is missing, even when an older
    /// binary for it is still lying in the output directory. Never retried.
    pub async fn build(&self, run: &JobRun, profile: &BuildProfile) -> Result<ArtifactSet> {
        let start = Instant::now();
        let request = BuildRequest {
            package: self.config.package.clone(),
            targets: self.config.targets.clone(),
            profile: profile.clone(),
            workspace: self.config.workspace.clone(),
            output_dir: self.config.output_dir.clone(),
            capture_lines: self.config.capture_lines,
        };

        info!(
            run_id = %run.id(),
            package = %request.package,
            targets = request.targets.len(),
            "Building benchmarks"
        );

        let output = self.toolchain.build(&request).await?;

        if output.exit_code != 0 {
            error!(run_id = %run.id(), exit_code = output.exit_code, "Build failed");
            return Err(Error::Build {
                exit_code: output.exit_code,
                captured_output: output.captured_output,
            });
        }

        let mut artifacts = ArtifactSet::new();
        for target in &self.config.targets {
            match output.artifacts.get(target) {
                Some(path) if path.is_file() => artifacts.insert(target.clone(), path),
                _ => {
                    error!(run_id = %run.id(), target = %target, "Build output missing target");
                    return Err(Error::MissingTarget {
                        target: target.clone(),
                    });
                }
            }
        }

        info!(
            run_id = %run.id(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Build completed"
        );
        Ok(artifacts)
    }
}
