//! Test fixtures for creating sample data.

use benchline_core::change::{ChangeEvent, ChangeKind};
use benchline_core::config::{BuildConfig, DispatchConfig, TriggerRule};
use std::path::Path;

/// Factory for change events.
pub struct EventFixture;

impl EventFixture {
    /// Push to `main` touching a Rust source file.
    pub fn push_main(commit_sha: &str) -> ChangeEvent {
        ChangeEvent::push("refs/heads/main", commit_sha, ["src/lexer.rs"])
    }

    /// Push to `main` touching only documentation.
    pub fn push_docs(commit_sha: &str) -> ChangeEvent {
        ChangeEvent::push("refs/heads/main", commit_sha, ["README.md", "docs/index.md"])
    }

    /// Push to a feature branch touching a Rust source file.
    pub fn push_branch(branch: &str, commit_sha: &str) -> ChangeEvent {
        ChangeEvent::push(format!("refs/heads/{branch}"), commit_sha, ["src/lexer.rs"])
    }

    /// New commits on pull request `pr_number`.
    pub fn pr_synchronized(pr_number: u64, commit_sha: &str) -> ChangeEvent {
        ChangeEvent::pull_request(
            ChangeKind::PullRequestSynchronized,
            pr_number,
            commit_sha,
            ["crates/oxc_parser/src/lexer/mod.rs"],
        )
    }

    pub fn manual(commit_sha: &str) -> ChangeEvent {
        ChangeEvent::manual("refs/heads/main", commit_sha)
    }
}

/// Factory for dispatch configuration.
pub struct ConfigFixture;

impl ConfigFixture {
    /// Two targets, `*.rs` on `main`, rooted at `workspace`.
    pub fn for_workspace(workspace: &Path) -> DispatchConfig {
        DispatchConfig {
            workflow: "benchmark".to_string(),
            trigger: TriggerRule {
                ref_patterns: vec!["main".to_string()],
                path_patterns: vec!["*.rs".to_string()],
                ..TriggerRule::default()
            },
            build: BuildConfig {
                targets: vec!["lexer".to_string(), "parser".to_string()],
                workspace: workspace.to_path_buf(),
                ..BuildConfig::default()
            },
            ..DispatchConfig::default()
        }
    }

    /// Every default target, rooted at `workspace`.
    pub fn all_targets(workspace: &Path) -> DispatchConfig {
        let mut config = DispatchConfig::default();
        config.build.workspace = workspace.to_path_buf();
        config
    }
}
