//! Loading configuration and change events.

use anyhow::{Context, Result};
use benchline_core::change::ChangeEvent;
use benchline_core::config::DispatchConfig;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Load and validate `benchline.yaml`.
pub fn load_config(path: &Path) -> Result<Arc<DispatchConfig>> {
    let config = DispatchConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok(Arc::new(config))
}

/// Read change events from a file, or stdin for `-`.
pub fn read_events(source: &str) -> Result<Vec<ChangeEvent>> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read events from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read events from {}", source))?
    };
    parse_events(&content)
}

/// Parse one JSON object or a newline-delimited stream of them.
pub fn parse_events(content: &str) -> Result<Vec<ChangeEvent>> {
    let events = serde_json::Deserializer::from_str(content)
        .into_iter::<ChangeEvent>()
        .enumerate()
        .map(|(i, event)| event.with_context(|| format!("Invalid change event #{}", i + 1)))
        .collect::<Result<Vec<_>>>()?;

    if events.is_empty() {
        anyhow::bail!("No change events found");
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchline_core::change::ChangeKind;

    #[test]
    fn test_parse_single_pretty_printed_event() {
        let events = parse_events(
            r#"{
                "kind": "push",
                "ref": "refs/heads/main",
                "changed_paths": ["src/lexer.rs"],
                "commit_sha": "abc123"
            }"#,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Push);
        assert_eq!(events[0].branch(), "main");
    }

    #[test]
    fn test_parse_ndjson_stream_in_order() {
        let events = parse_events(concat!(
            r#"{"kind":"pull_request_synchronized","ref":"refs/pull/42/merge","commit_sha":"a1","pr_number":42}"#,
            "\n",
            r#"{"kind":"pull_request_synchronized","ref":"refs/pull/42/merge","commit_sha":"b2","pr_number":42}"#,
            "\n",
        ))
        .unwrap();

        let shas: Vec<_> = events.iter().map(|e| e.commit_sha.as_str()).collect();
        assert_eq!(shas, vec!["a1", "b2"]);
    }

    #[test]
    fn test_invalid_event_names_position() {
        let err = parse_events(r#"{"kind":"manual","ref":"main","commit_sha":"a"} {"kind":"tag"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(parse_events("  \n").is_err());
    }

    #[test]
    fn test_load_config_reports_path() {
        let err = load_config(Path::new("/nonexistent/benchline.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/benchline.yaml"));
    }
}
