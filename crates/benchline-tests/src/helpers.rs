//! Test helper functions and utilities.

use benchline_core::run::{JobRun, JobState};
use std::time::Duration;

/// Default wait used when polling for run state.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for a condition with timeout.
///
/// Uses the tokio clock so it behaves under paused time.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait until `run` reaches `state`.
pub async fn wait_for_state(run: &JobRun, state: JobState) -> bool {
    wait_for(POLL_TIMEOUT, Duration::from_millis(5), || async move { run.state() == state }).await
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
