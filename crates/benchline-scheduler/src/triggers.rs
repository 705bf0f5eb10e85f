//! Trigger matching and evaluation.

use benchline_core::change::{ChangeEvent, ChangeKind};
use benchline_core::config::TriggerRule;
use tracing::debug;

/// Decides whether a change event starts a run.
#[derive(Debug, Clone, Copy)]
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Check if `event` should start a run under `rules`.
    pub fn admit(&self, event: &ChangeEvent, rules: &TriggerRule) -> bool {
        if event.kind == ChangeKind::Manual {
            return true;
        }

        if !rules.kinds.contains(&event.kind) {
            debug!(kind = %event.kind, "Event kind not enabled");
            return false;
        }

        if event.kind == ChangeKind::Push && !self.ref_matches(&rules.ref_patterns, event.branch()) {
            debug!(git_ref = %event.git_ref, "Ref does not match any pattern");
            return false;
        }

        let changed: Vec<&str> = event.changed_paths.iter().map(String::as_str).collect();
        if !self.paths_match(&rules.path_patterns, &changed) {
            debug!(paths = changed.len(), "No changed path matches the path filters");
            return false;
        }

        true
    }

    fn ref_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true; // No ref filtering
        }
        patterns.iter().any(|p| glob_match(p, branch))
    }

    fn paths_match(&self, patterns: &[String], changed: &[&str]) -> bool {
        // Manual re-runs and API triggers carry no paths
        if patterns.is_empty() || changed.is_empty() {
            return true;
        }
        changed
            .iter()
            .any(|path| patterns.iter().any(|p| path_glob_match(p, path)))
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Match a path filter. Patterns without `/` match the file name only.
pub fn path_glob_match(pattern: &str, path: &str) -> bool {
    let path = path.trim_start_matches("./");
    if !pattern.contains('/') {
        let name = path.rsplit('/').next().unwrap_or(path);
        return segment_match(pattern.as_bytes(), name.as_bytes());
    }
    glob_match(pattern, path)
}

/// Segment-aware glob: `*` and `?` stay within a segment, `**` spans any
/// number of segments including none.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').collect();
    let text: Vec<&str> = text.split('/').collect();
    segments_match(&pattern, &text)
}

fn segments_match(pattern: &[&str], text: &[&str]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&"**", rest)) => (0..=text.len()).any(|skip| segments_match(rest, &text[skip..])),
        Some((head, rest)) => match text.split_first() {
            Some((segment, remaining)) => {
                segment_match(head.as_bytes(), segment.as_bytes()) && segments_match(rest, remaining)
            }
            None => false,
        },
    }
}

fn segment_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(ref_patterns: &[&str], path_patterns: &[&str]) -> TriggerRule {
        TriggerRule {
            ref_patterns: ref_patterns.iter().map(|s| s.to_string()).collect(),
            path_patterns: path_patterns.iter().map(|s| s.to_string()).collect(),
            ..TriggerRule::default()
        }
    }

    #[test]
    fn test_branch_match_exact() {
        assert!(glob_match("main", "main"));
        assert!(!glob_match("main", "develop"));
        assert!(!glob_match("main", "main-2"));
    }

    #[test]
    fn test_branch_match_glob() {
        assert!(glob_match("feature/*", "feature/foo"));
        assert!(!glob_match("feature/*", "feature/foo/bar"));
        assert!(glob_match("release/**", "release/v1/hotfix"));
        assert!(glob_match("release-?", "release-1"));
    }

    #[test]
    fn test_double_star_matches_zero_segments() {
        assert!(glob_match("**/*.rs", "build.rs"));
        assert!(glob_match("**/*.rs", "crates/oxc_parser/src/lexer/mod.rs"));
        assert!(glob_match("napi/parser/**/*.mjs", "napi/parser/index.mjs"));
        assert!(!glob_match("napi/parser/**/*.mjs", "napi/minify/index.mjs"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(glob_match("tasks/benchmark/codspeed/*.mjs", "tasks/benchmark/codspeed/upload.mjs"));
        assert!(!glob_match("tasks/*.mjs", "tasks/benchmark/upload.mjs"));
    }

    #[test]
    fn test_bare_name_pattern_matches_file_name() {
        assert!(path_glob_match("*.rs", "src/lexer.rs"));
        assert!(path_glob_match("Cargo.lock", "Cargo.lock"));
        assert!(path_glob_match("Cargo.lock", "./Cargo.lock"));
        assert!(!path_glob_match("*.rs", "src/lexer.rs.orig"));
    }

    #[test]
    fn test_manual_always_admitted() {
        let matcher = TriggerMatcher::new();
        let mut no_kinds = rules(&["never"], &["never"]);
        no_kinds.kinds.clear();
        assert!(matcher.admit(&ChangeEvent::manual("feature/x", "abc"), &no_kinds));
    }

    #[test]
    fn test_push_to_unmatched_ref_rejected() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::push("refs/heads/develop", "abc", ["src/lexer.rs"]);
        assert!(!matcher.admit(&event, &rules(&["main"], &["*.rs"])));
    }

    #[test]
    fn test_push_strips_refs_heads() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::push("refs/heads/main", "abc", ["src/lexer.rs"]);
        assert!(matcher.admit(&event, &rules(&["main"], &["*.rs"])));
    }

    #[test]
    fn test_unmatched_paths_rejected() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::push("main", "abc", ["README.md", "docs/intro.md"]);
        assert!(!matcher.admit(&event, &rules(&["main"], &["*.rs", "Cargo.lock"])));
    }

    #[test]
    fn test_single_matching_path_admits() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::push("main", "abc", ["README.md", "Cargo.lock"]);
        assert!(matcher.admit(&event, &rules(&["main"], &["*.rs", "Cargo.lock"])));
    }

    #[test]
    fn test_empty_changed_paths_admit() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::push("main", "abc", Vec::<String>::new());
        assert!(matcher.admit(&event, &rules(&["main"], &["*.rs"])));
    }

    #[test]
    fn test_pull_request_ignores_ref_patterns() {
        let matcher = TriggerMatcher::new();
        let event = ChangeEvent::pull_request(
            ChangeKind::PullRequestSynchronized,
            42,
            "abc",
            ["crates/oxc_linter/src/lib.rs"],
        );
        assert!(matcher.admit(&event, &rules(&["main"], &["**/*.rs"])));
    }

    #[test]
    fn test_disabled_kind_rejected() {
        let matcher = TriggerMatcher::new();
        let mut only_push = rules(&["main"], &[]);
        only_push.kinds = [ChangeKind::Push].into_iter().collect();

        let event = ChangeEvent::pull_request(ChangeKind::PullRequestOpened, 7, "abc", ["a.rs"]);
        assert!(!matcher.admit(&event, &only_push));
    }

    #[test]
    fn test_default_rules_match_workflow_paths() {
        let matcher = TriggerMatcher::new();
        let defaults = TriggerRule::default();
        for path in [
            "crates/oxc_parser/src/lib.rs",
            "napi/parser/src/index.js",
            "rust-toolchain.toml",
            ".github/workflows/benchmark.yml",
        ] {
            let event = ChangeEvent::push("main", "abc", [path]);
            assert!(matcher.admit(&event, &defaults), "{path} should trigger");
        }
        let docs = ChangeEvent::push("main", "abc", ["README.md"]);
        assert!(!matcher.admit(&docs, &defaults));
    }
}
