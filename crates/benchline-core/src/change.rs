//! Inbound change events delivered by the source-control system.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of change that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Manual,
    PullRequestOpened,
    PullRequestSynchronized,
    Push,
}

impl ChangeKind {
    pub fn is_pull_request(&self) -> bool {
        matches!(
            self,
            ChangeKind::PullRequestOpened | ChangeKind::PullRequestSynchronized
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Manual => "manual",
            ChangeKind::PullRequestOpened => "pull_request_opened",
            ChangeKind::PullRequestSynchronized => "pull_request_synchronized",
            ChangeKind::Push => "push",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change event. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub changed_paths: BTreeSet<String>,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub pr_number: Option<u64>,
}

impl ChangeEvent {
    pub fn manual(git_ref: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Manual,
            git_ref: git_ref.into(),
            changed_paths: BTreeSet::new(),
            commit_sha: commit_sha.into(),
            pr_number: None,
        }
    }

    pub fn push<I, S>(git_ref: impl Into<String>, commit_sha: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ChangeKind::Push,
            git_ref: git_ref.into(),
            changed_paths: paths.into_iter().map(Into::into).collect(),
            commit_sha: commit_sha.into(),
            pr_number: None,
        }
    }

    pub fn pull_request<I, S>(
        kind: ChangeKind,
        pr_number: u64,
        commit_sha: impl Into<String>,
        paths: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            git_ref: format!("refs/pull/{pr_number}/merge"),
            changed_paths: paths.into_iter().map(Into::into).collect(),
            commit_sha: commit_sha.into(),
            pr_number: Some(pr_number),
        }
    }

    /// Branch name with any `refs/heads/` prefix removed.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}
