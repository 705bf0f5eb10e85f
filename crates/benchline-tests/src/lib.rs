//! Integration test infrastructure for Benchline.
//!
//! Wires the scheduler and pipeline to in-process fakes for the toolchain,
//! the benchmark service and the event sink, inside a temporary workspace.
//!
//! # Usage
//!
//! ```ignore
//! use benchline_tests::{EventFixture, TestContext};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new().unwrap();
//!     let outcome = ctx.scheduler.process(&EventFixture::push_main("abc")).await;
//! }
//! ```

pub mod context;
pub mod fakes;
pub mod fixtures;
pub mod helpers;

pub use context::{TEST_TOKEN, TestContext};
pub use fakes::*;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,benchline_scheduler=debug,benchline_runner=debug")),
        )
        .with_test_writer()
        .try_init();
}
