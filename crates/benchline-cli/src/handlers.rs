//! Command handlers.

use crate::commands::EventOutput;
use crate::config::{load_config, read_events};
use crate::outcome::{EXIT_OK, batch_exit_code, exit_code};
use crate::sinks::{JsonLinesSink, TracingSink};
use anyhow::{Context, Result};
use benchline_core::config::DispatchConfig;
use benchline_core::ports::EventSink;
use benchline_core::run::RunOutcome;
use benchline_core::secrets::Credentials;
use benchline_runner::{CargoToolchain, CommandBenchmarkService};
use benchline_scheduler::{ConcurrencyController, RunPipeline, Scheduler, TriggerMatcher};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Write a default configuration.
pub fn init(path: &Path, force: bool) -> Result<u8> {
    if path.exists() && !force {
        eprintln!("{} {} already exists", style("!").yellow(), path.display());
        return Ok(EXIT_OK);
    }

    let template = serde_yaml::to_string(&DispatchConfig::default())?;
    std::fs::write(path, template).with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("{} Created {}", style("✓").green(), path.display());
    Ok(EXIT_OK)
}

/// Validate a configuration file and summarize it.
pub fn validate(path: &Path) -> Result<u8> {
    let config = load_config(path)?;

    eprintln!(
        "{} Workflow \"{}\" is valid",
        style("✓").green(),
        config.workflow
    );
    let kinds: Vec<_> = config.trigger.kinds.iter().map(|k| k.as_str()).collect();
    eprintln!("  Triggers: {}", kinds.join(", "));
    eprintln!("  Refs: {}", config.trigger.ref_patterns.join(", "));
    eprintln!("  Path filters: {}", config.trigger.path_patterns.len());
    eprintln!(
        "  Targets ({}): {}",
        config.build.package,
        config.build.targets.join(", ")
    );
    eprintln!("  Timeout: {} minutes", config.runner.timeout_minutes);

    Ok(EXIT_OK)
}

/// Print the configuration JSON schema.
pub fn schema() -> Result<u8> {
    let schema = schemars::schema_for!(DispatchConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(EXIT_OK)
}

/// Report admission and the dedup key for each event, without running.
pub fn check(config: &Path, source: &str) -> Result<u8> {
    let config = load_config(config)?;
    let events = read_events(source)?;
    let matcher = TriggerMatcher::new();
    let controller = ConcurrencyController::new(config.workflow.clone());

    for event in &events {
        if matcher.admit(event, &config.trigger) {
            println!(
                "{} {} {} -> {}",
                style("admit").green(),
                event.kind,
                event.git_ref,
                controller.dedup_key(event)
            );
        } else {
            println!("{} {} {}", style("skip").dim(), event.kind, event.git_ref);
        }
    }

    Ok(EXIT_OK)
}

/// Run the full pipeline for each event.
///
/// The token is only required once some event is admitted.
pub async fn dispatch(config: &Path, source: &str, output: EventOutput) -> Result<u8> {
    let config = load_config(config)?;
    let events = read_events(source)?;

    let matcher = TriggerMatcher::new();
    if !events.iter().any(|event| matcher.admit(event, &config.trigger)) {
        for event in &events {
            info!(kind = %event.kind, git_ref = %event.git_ref, "Event not admitted");
            print_outcome(&RunOutcome::NotAdmitted);
        }
        return Ok(EXIT_OK);
    }

    let credentials = Credentials::from_env(&config.runner.token_env)
        .with_context(|| format!("Set {} to the benchmark service token", config.runner.token_env))?;

    let sink: Arc<dyn EventSink> = match output {
        EventOutput::Log => Arc::new(TracingSink),
        EventOutput::Json => Arc::new(JsonLinesSink::stdout()),
    };
    let service = CommandBenchmarkService::new(config.runner.command.clone())
        .capture_lines(config.build.capture_lines);
    let pipeline = RunPipeline::new(
        config.clone(),
        Arc::new(CargoToolchain::new()),
        Arc::new(service),
        sink.clone(),
        credentials,
    );
    let scheduler = Scheduler::new(Arc::new(pipeline), sink);

    let outcomes = scheduler.process_all(events).await;
    for outcome in &outcomes {
        print_outcome(outcome);
    }

    Ok(batch_exit_code(&outcomes))
}

fn print_outcome(outcome: &RunOutcome) {
    let Some(run) = outcome.run() else {
        eprintln!("{} not admitted", style("-").dim());
        return;
    };

    let label = match outcome {
        RunOutcome::Succeeded { .. } => style("✓").green(),
        RunOutcome::Cancelled { .. } => style("~").yellow(),
        _ => style("✗").red(),
    };
    eprintln!(
        "{} {} {} ({}, exit {})",
        label,
        run.dedup_key,
        run.id,
        outcome.label(),
        exit_code(outcome)
    );

    match outcome {
        RunOutcome::Succeeded { result, .. } if !result.payload.is_empty() => {
            eprintln!("{}", result.payload.trim_end());
        }
        RunOutcome::Failed { error, .. } => eprintln!("  {}", error),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_valid_default_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("benchline.yaml");

        assert_eq!(init(&path, false).unwrap(), 0);
        let config = DispatchConfig::from_file(&path).unwrap();
        assert_eq!(config.workflow, "benchmark");
        assert_eq!(config.build.targets.len(), 7);

        assert_eq!(validate(&path).unwrap(), 0);
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("benchline.yaml");
        std::fs::write(&path, "workflow: custom\n").unwrap();

        init(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "workflow: custom\n");

        init(&path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("oxc_benchmark"));
    }

    #[test]
    fn test_check_reads_event_file() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("benchline.yaml");
        init(&config, false).unwrap();
        let event = tmp.path().join("event.json");
        std::fs::write(
            &event,
            r#"{"kind":"push","ref":"refs/heads/main","changed_paths":["src/lexer.rs"],"commit_sha":"abc"}"#,
        )
        .unwrap();

        assert_eq!(check(&config, event.to_str().unwrap()).unwrap(), 0);
    }

    fn config_without_token(dir: &Path) -> std::path::PathBuf {
        let mut config = DispatchConfig::default();
        config.runner.token_env = "BENCHLINE_TEST_TOKEN_NEVER_SET".to_string();
        let path = dir.join("benchline.yaml");
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_dispatch_needs_no_token_when_nothing_is_admitted() {
        let tmp = TempDir::new().unwrap();
        let config = config_without_token(tmp.path());
        let event = tmp.path().join("event.json");
        std::fs::write(
            &event,
            r#"{"kind":"push","ref":"refs/heads/main","changed_paths":["README.md","docs/guide.md"],"commit_sha":"abc"}"#,
        )
        .unwrap();

        let code = dispatch(&config, event.to_str().unwrap(), EventOutput::Log)
            .await
            .unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_dispatch_requires_token_for_admitted_event() {
        let tmp = TempDir::new().unwrap();
        let config = config_without_token(tmp.path());
        let event = tmp.path().join("event.json");
        std::fs::write(
            &event,
            r#"{"kind":"push","ref":"refs/heads/main","changed_paths":["crates/oxc/src/lib.rs"],"commit_sha":"abc"}"#,
        )
        .unwrap();

        let err = dispatch(&config, event.to_str().unwrap(), EventOutput::Log)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BENCHLINE_TEST_TOKEN_NEVER_SET"));
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("benchline.yaml");
        std::fs::write(&path, "runner:\n  timeout_minutes: 0\n").unwrap();

        assert!(validate(&path).is_err());
    }
}
