//! Cargo toolchain adapter.
//!
//! Cargo runs with `--message-format=json-render-diagnostics`: stdout carries
//! one JSON message per line, and every bench it builds (or finds fresh) is
//! reported with the path of its executable. Diagnostics stay human-readable
//! on stderr, which is what a failed build captures.

use crate::process::{CaptureOptions, run_captured};
use async_trait::async_trait;
use benchline_core::Result;
use benchline_core::artifact::ArtifactSet;
use benchline_core::ports::{BuildOutput, BuildRequest, Toolchain};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// The parts of a cargo JSON message the adapter reads.
#[derive(Debug, Deserialize)]
struct CargoMessage {
    reason: String,
    #[serde(default)]
    target: Option<CargoTarget>,
    #[serde(default)]
    executable: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CargoTarget {
    name: String,
    #[serde(default)]
    kind: Vec<String>,
}

/// Collect the executables of requested bench targets from cargo's JSON
/// output. Lines that are not cargo messages are skipped.
pub fn bench_executables(stdout: &str, targets: &[String]) -> ArtifactSet {
    let mut artifacts = ArtifactSet::new();
    for line in stdout.lines() {
        let Ok(message) = serde_json::from_str::<CargoMessage>(line) else {
            continue;
        };
        if message.reason != "compiler-artifact" {
            continue;
        }
        let (Some(target), Some(executable)) = (message.target, message.executable) else {
            continue;
        };
        if target.kind.iter().any(|k| k == "bench") && targets.contains(&target.name) {
            debug!(target = %target.name, executable = %executable.display(), "Cargo built bench");
            artifacts.insert(target.name, executable);
        }
    }
    artifacts
}

/// Builds bench targets with `cargo build`.
pub struct CargoToolchain {
    cargo: String,
}

impl CargoToolchain {
    pub fn new() -> Self {
        Self {
            cargo: std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()),
        }
    }

    /// Use a specific cargo binary.
    pub fn with_binary(cargo: impl Into<String>) -> Self {
        Self {
            cargo: cargo.into(),
        }
    }

    /// Arguments passed to cargo for a request.
    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--message-format=json-render-diagnostics".to_string(),
        ];
        if request.profile.release {
            args.push("--release".to_string());
        }
        args.push("-p".to_string());
        args.push(request.package.clone());
        for target in &request.targets {
            args.push("--bench".to_string());
            args.push(target.clone());
        }
        if !request.profile.features.is_empty() {
            args.push("--features".to_string());
            args.push(request.profile.features.join(","));
        }
        args
    }
}

impl Default for CargoToolchain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Toolchain for CargoToolchain {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutput> {
        let args = Self::build_args(request);
        info!(
            cargo = %self.cargo,
            args = %args.join(" "),
            workspace = %request.workspace.display(),
            "Invoking cargo"
        );

        let mut command = Command::new(&self.cargo);
        command
            .args(&args)
            .current_dir(&request.workspace)
            .envs(&request.profile.env);

        let options = CaptureOptions::new("cargo build")
            .tail_lines(request.capture_lines)
            .tail_stderr_only();
        let output = run_captured(command, &options).await?;

        Ok(BuildOutput {
            exit_code: output.exit_code,
            output_dir: request.workspace.join(&request.output_dir),
            artifacts: bench_executables(&output.stdout, &request.targets),
            captured_output: output.tail,
        })
    }
}
