//! Dispatcher configuration.
//!
//! These types represent the user-authored `benchline.yaml`. The defaults
//! reproduce the benchmark workflow this tool was modelled on: run on pull
//! requests and pushes to `main` that touch Rust sources, build the
//! `oxc_benchmark` bench targets with instrumentation-friendly flags, stage
//! them under `target/codspeed/`, and hand them to `cargo codspeed run`.

use crate::change::ChangeKind;
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on the benchmark run timeout.
pub const MAX_TIMEOUT_MINUTES: u32 = 360;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DispatchConfig {
    /// Workflow identity, the first half of every dedup key.
    #[serde(default = "default_workflow")]
    pub workflow: String,
    #[serde(default)]
    pub trigger: TriggerRule,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_workflow() -> String {
    "benchmark".to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workflow: default_workflow(),
            trigger: TriggerRule::default(),
            build: BuildConfig::default(),
            artifacts: ArtifactConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workflow.trim().is_empty() {
            return Err(Error::Config("workflow must not be empty".into()));
        }
        if self.build.targets.is_empty() {
            return Err(Error::Config("build.targets must list at least one target".into()));
        }
        let mut seen = HashSet::new();
        for target in &self.build.targets {
            if target.is_empty() || target.contains(['/', '\\']) {
                return Err(Error::Config(format!("invalid target name: {target:?}")));
            }
            if !seen.insert(target.as_str()) {
                return Err(Error::Config(format!("duplicate target: {target}")));
            }
        }
        if self.runner.timeout_minutes == 0 || self.runner.timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(Error::Config(format!(
                "runner.timeout_minutes must be in 1..={MAX_TIMEOUT_MINUTES}, got {}",
                self.runner.timeout_minutes
            )));
        }
        if self.runner.command.is_empty() {
            return Err(Error::Config("runner.command must not be empty".into()));
        }
        Ok(())
    }
}

/// Rule deciding which change events start a run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerRule {
    #[serde(default = "default_kinds")]
    pub kinds: BTreeSet<ChangeKind>,
    #[serde(default = "default_ref_patterns")]
    pub ref_patterns: Vec<String>,
    #[serde(default = "default_path_patterns")]
    pub path_patterns: Vec<String>,
}

fn default_kinds() -> BTreeSet<ChangeKind> {
    BTreeSet::from([
        ChangeKind::Manual,
        ChangeKind::PullRequestOpened,
        ChangeKind::PullRequestSynchronized,
        ChangeKind::Push,
    ])
}

fn default_ref_patterns() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_path_patterns() -> Vec<String> {
    [
        "**/*.rs",
        "napi/parser/**/*.js",
        "napi/parser/**/*.mjs",
        "Cargo.lock",
        "rust-toolchain.toml",
        ".github/workflows/benchmark.yml",
        "tasks/benchmark/codspeed/*.mjs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for TriggerRule {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
            ref_patterns: default_ref_patterns(),
            path_patterns: default_path_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildConfig {
    /// Cargo package holding the bench targets.
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub profile: BuildProfile,
    /// Workspace root the toolchain runs in.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Directory the toolchain writes bench binaries to, relative to `workspace`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of trailing output lines kept on failure.
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
}

fn default_package() -> String {
    "oxc_benchmark".to_string()
}

fn default_targets() -> Vec<String> {
    [
        "lexer",
        "parser",
        "transformer",
        "semantic",
        "linter",
        "minifier",
        "codegen_sourcemap",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/release/deps")
}

fn default_capture_lines() -> usize {
    200
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            targets: default_targets(),
            profile: BuildProfile::default(),
            workspace: default_workspace(),
            output_dir: default_output_dir(),
            capture_lines: default_capture_lines(),
        }
    }
}

impl BuildConfig {
    pub fn output_path(&self) -> PathBuf {
        self.workspace.join(&self.output_dir)
    }
}

/// Environment profile handed opaquely to the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildProfile {
    #[serde(default = "default_profile_env")]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default = "default_true")]
    pub release: bool,
}

fn default_profile_env() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "RUSTFLAGS".to_string(),
        "-C debuginfo=1 -C strip=none -g --cfg codspeed".to_string(),
    )])
}

fn default_features() -> Vec<String> {
    vec!["codspeed".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for BuildProfile {
    fn default() -> Self {
        Self {
            env: default_profile_env(),
            features: default_features(),
            release: true,
        }
    }
}

/// How the normalizer picks one build output when several match a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Most recently modified wins; ties go to the greatest file name.
    #[default]
    Newest,
    /// Exactly one candidate is required.
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactConfig {
    /// Canonical directory the runner reads from, relative to `build.workspace`.
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Extensions never considered as a target's executable.
    #[serde(default = "default_ignore_extensions")]
    pub ignore_extensions: Vec<String>,
    /// Extensions deleted from `dest_dir` after staging.
    #[serde(default = "default_discard_extensions")]
    pub discard_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub write_manifest: bool,
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("target/codspeed/oxc_benchmark")
}

fn default_ignore_extensions() -> Vec<String> {
    ["d", "rlib", "rmeta", "pdb"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_discard_extensions() -> Vec<String> {
    vec!["d".to_string()]
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dest_dir: default_dest_dir(),
            selection: SelectionPolicy::default(),
            ignore_extensions: default_ignore_extensions(),
            discard_extensions: default_discard_extensions(),
            write_manifest: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunnerConfig {
    /// Benchmark service command line; the first element is the program.
    #[serde(default = "default_runner_command")]
    pub command: Vec<String>,
    /// Environment variable the token is read from and passed through.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_minutes: u32,
    /// Time between SIGTERM and SIGKILL for the benchmark command's process
    /// group once the timeout elapses.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_seconds: u64,
}

fn default_runner_command() -> Vec<String> {
    vec![
        "cargo".to_string(),
        "codspeed".to_string(),
        "run".to_string(),
    ]
}

fn default_token_env() -> String {
    "CODSPEED_TOKEN".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_kill_grace() -> u64 {
    10
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            token_env: default_token_env(),
            timeout_minutes: default_timeout(),
            kill_grace_seconds: default_kill_grace(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes) * 60)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_seconds)
    }
}
