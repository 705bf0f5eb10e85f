//! Pipeline failure paths, admission and slot release.

use benchline_core::Error;
use benchline_core::artifact::{ArtifactManifest, ArtifactSet};
use benchline_core::config::ArtifactConfig;
use benchline_core::events::{Event, RunCompletedPayload};
use benchline_core::run::{JobState, RunOutcome};
use benchline_core::RunId;
use benchline_runner::ArtifactNormalizer;
use benchline_tests::{
    EventFixture, FakeBenchmarkService, FakeToolchain, MemorySink, TEST_TOKEN, TestContext,
    assert_completes_within, wait_for_state,
};
use std::time::Duration;

fn completion(sink: &MemorySink, run_id: RunId) -> RunCompletedPayload {
    sink.for_run(run_id)
        .into_iter()
        .find_map(|e| match e {
            Event::RunCompleted(p) => Some(p),
            _ => None,
        })
        .expect("run completion should be reported")
}

#[tokio::test]
async fn test_docs_only_push_is_not_admitted() {
    let ctx = TestContext::new().unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::push_docs("abc")).await;

    assert!(matches!(outcome, RunOutcome::NotAdmitted));
    assert!(outcome.is_success());
    assert_eq!(ctx.toolchain.started(), 0);
    assert!(ctx.sink.events().is_empty());
}

#[tokio::test]
async fn test_push_to_other_branch_is_not_admitted() {
    let ctx = TestContext::new().unwrap();

    let outcome = ctx
        .scheduler
        .process(&EventFixture::push_branch("feature/lexer", "abc"))
        .await;

    assert!(matches!(outcome, RunOutcome::NotAdmitted));
    assert_eq!(ctx.toolchain.started(), 0);
}

#[tokio::test]
async fn test_manual_event_runs_without_changed_paths() {
    let ctx = TestContext::new().unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::manual("abc")).await;

    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));
    assert_eq!(ctx.toolchain.builds(), 1);
}

#[tokio::test]
async fn test_run_queued_event_carries_dedup_key() {
    let ctx = TestContext::new().unwrap();

    let run = ctx
        .scheduler
        .admit(&EventFixture::pr_synchronized(7, "abc"))
        .await
        .unwrap();

    match ctx.sink.events().first() {
        Some(Event::RunQueued(p)) => {
            assert_eq!(p.run_id, run.id());
            assert_eq!(p.dedup_key.as_str(), "benchmark-7");
            assert_eq!(p.pr_number, Some(7));
            assert_eq!(p.git_ref, "refs/pull/7/merge");
        }
        other => panic!("unexpected first event: {other:?}"),
    }
}

#[tokio::test]
async fn test_build_failure_skips_remaining_stages() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().exit_code(101))
        .build()
        .unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::push_main("abc")).await;

    let run = match outcome {
        RunOutcome::Failed {
            run,
            error: Error::Build {
                exit_code,
                captured_output,
            },
        } => {
            assert_eq!(exit_code, 101);
            assert!(captured_output.contains("could not compile"));
            run
        }
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(ctx.sink.stages_started(run.id), vec![JobState::Building]);
    assert_eq!(ctx.service.invocations(), 0);
    assert!(!ctx.dest_dir().exists());

    let completed = completion(&ctx.sink, run.id);
    assert_eq!(completed.state, JobState::Failed);
    assert_eq!(completed.error_kind.as_deref(), Some("build_error"));
    assert_eq!(completed.exit_code, Some(101));
    assert!(ctx.scheduler.controller().is_empty().await);
}

#[tokio::test]
async fn test_missing_target_fails_build() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().skip("parser"))
        .build()
        .unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::push_main("abc")).await;

    match outcome {
        RunOutcome::Failed {
            error: Error::MissingTarget { target },
            ..
        } => assert_eq!(target, "parser"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.service.invocations(), 0);
}

#[tokio::test]
async fn test_stale_binary_from_earlier_build_is_not_staged() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().skip("parser"))
        .build()
        .unwrap();
    std::fs::create_dir_all(ctx.output_dir()).unwrap();
    std::fs::write(ctx.output_dir().join("parser-deadbeef"), "stale parser").unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::push_main("abc")).await;

    match outcome {
        RunOutcome::Failed {
            error: Error::MissingTarget { target },
            ..
        } => assert_eq!(target, "parser"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ctx.service.invocations(), 0);
    assert!(!ctx.dest_dir().join("parser").exists());
}

#[tokio::test]
async fn test_benchmark_failure_surfaces_masked_payload() {
    let ctx = TestContext::builder()
        .service(FakeBenchmarkService::new().exit_code(1).payload("lexer regressed by 12%"))
        .build()
        .unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::push_main("abc")).await;

    let run = match outcome {
        RunOutcome::Failed {
            run,
            error: Error::RunFailed { exit_code, payload },
        } => {
            assert_eq!(exit_code, 1);
            assert!(payload.contains("lexer regressed by 12%"));
            assert!(!payload.contains(TEST_TOKEN));
            run
        }
        other => panic!("unexpected outcome: {other:?}"),
    };

    let completed = completion(&ctx.sink, run.id);
    assert_eq!(completed.error_kind.as_deref(), Some("run_failed"));
    assert_eq!(completed.exit_code, Some(1));
}

#[tokio::test]
async fn test_distinct_commits_run_independently() {
    let ctx = TestContext::new().unwrap();

    let outcomes = ctx
        .scheduler
        .process_all([EventFixture::push_main("aaa"), EventFixture::push_main("bbb")])
        .await;

    assert!(outcomes.iter().all(|o| matches!(o, RunOutcome::Succeeded { .. })));
    assert!(ctx.sink.superseded().is_empty());
    assert_eq!(ctx.service.invocations(), 2);
}

#[tokio::test]
async fn test_runs_for_different_keys_take_turns_in_the_workspace() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().gated())
        .build()
        .unwrap();

    let first = ctx
        .scheduler
        .handle_event(&EventFixture::push_main("aaa"))
        .await
        .unwrap();
    assert!(wait_for_state(&first.run, JobState::Building).await);

    let second = ctx
        .scheduler
        .handle_event(&EventFixture::push_main("bbb"))
        .await
        .unwrap();
    assert_ne!(first.run.dedup_key(), second.run.dedup_key());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(second.run.state(), JobState::Pending);
    assert_eq!(ctx.toolchain.started(), 1);

    let (first_id, second_id) = (first.run.id(), second.run.id());
    ctx.toolchain.open_gate();
    let (a, b) = tokio::join!(first.outcome(), second.outcome());
    assert!(matches!(a, RunOutcome::Succeeded { .. }));
    assert!(matches!(b, RunOutcome::Succeeded { .. }));

    // The first run finished with the workspace before the second touched it.
    let events = ctx.sink.events();
    let first_done = events
        .iter()
        .position(|e| {
            matches!(e, Event::StageCompleted(p) if p.run_id == first_id && p.stage == JobState::Running)
        })
        .unwrap();
    let second_start = events
        .iter()
        .position(|e| matches!(e, Event::StageStarted(p) if p.run_id == second_id))
        .unwrap();
    assert!(first_done < second_start);
    assert_eq!(ctx.service.invocations(), 2);
}

#[tokio::test]
async fn test_run_superseded_while_waiting_for_workspace_never_builds() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().gated())
        .build()
        .unwrap();

    let holder = ctx
        .scheduler
        .handle_event(&EventFixture::push_main("aaa"))
        .await
        .unwrap();
    assert!(wait_for_state(&holder.run, JobState::Building).await);

    let waiting = ctx
        .scheduler
        .handle_event(&EventFixture::pr_synchronized(3, "bbb"))
        .await
        .unwrap();
    let latest = ctx
        .scheduler
        .handle_event(&EventFixture::pr_synchronized(3, "ccc"))
        .await
        .unwrap();

    let waiting_id = waiting.run.id();
    let outcome = assert_completes_within(waiting.outcome(), Duration::from_secs(2)).await;
    assert!(matches!(outcome, RunOutcome::Cancelled { .. }));
    assert!(ctx.sink.stages_started(waiting_id).is_empty());
    assert_eq!(ctx.toolchain.started(), 1);

    ctx.toolchain.open_gate();
    assert!(matches!(holder.outcome().await, RunOutcome::Succeeded { .. }));
    assert!(matches!(latest.outcome().await, RunOutcome::Succeeded { .. }));
}

#[tokio::test]
async fn test_panicking_run_releases_its_slot() {
    let ctx = TestContext::builder()
        .toolchain(FakeToolchain::new().panics())
        .build()
        .unwrap();

    let outcome = ctx.scheduler.process(&EventFixture::pr_synchronized(11, "aaa")).await;

    match outcome {
        RunOutcome::Failed {
            run,
            error: Error::Internal(message),
        } => {
            assert_eq!(run.state, JobState::Failed);
            assert!(message.contains("toolchain crashed"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(ctx.scheduler.controller().is_empty().await);
}

#[tokio::test]
async fn test_finished_key_is_admitted_again_without_supersede() {
    let ctx = TestContext::new().unwrap();

    let first = ctx.scheduler.process(&EventFixture::pr_synchronized(9, "aaa")).await;
    let second = ctx.scheduler.process(&EventFixture::pr_synchronized(9, "bbb")).await;

    assert!(matches!(first, RunOutcome::Succeeded { .. }));
    assert!(matches!(second, RunOutcome::Succeeded { .. }));
    assert!(ctx.sink.superseded().is_empty());
}

#[tokio::test]
async fn test_rerun_restages_identical_artifacts() {
    let ctx = TestContext::new().unwrap();

    ctx.scheduler.process(&EventFixture::manual("aaa")).await;
    let first = std::fs::read_to_string(ctx.dest_dir().join(ArtifactManifest::FILE_NAME)).unwrap();

    ctx.scheduler.process(&EventFixture::manual("aaa")).await;
    let second = std::fs::read_to_string(ctx.dest_dir().join(ArtifactManifest::FILE_NAME)).unwrap();

    assert_eq!(first, second);
    assert_eq!(ctx.service.staged_files()[0], ctx.service.staged_files()[1]);
}

#[test]
fn test_normalizer_names_the_missing_target() {
    let tmp = tempfile::TempDir::new().unwrap();
    let deps = tmp.path().join("target/release/deps");
    std::fs::create_dir_all(&deps).unwrap();
    std::fs::write(deps.join("lexer-0f3c9a1b"), "bin").unwrap();
    std::fs::write(deps.join("parser-0f3c9a1b.d"), "deps").unwrap();

    let artifacts: ArtifactSet = [("lexer", deps.join("lexer")), ("parser", deps.join("parser"))]
        .into_iter()
        .collect();
    let normalizer = ArtifactNormalizer::new(&ArtifactConfig::default());

    let err = normalizer
        .normalize(&artifacts, &tmp.path().join("staged"))
        .unwrap_err();
    match err {
        Error::Normalize { target, .. } => assert_eq!(target, "parser"),
        other => panic!("unexpected error: {other}"),
    }
}
