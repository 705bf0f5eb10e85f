//! Benchline Scheduler
//!
//! Decides which change events start a benchmark run, keeps at most one run
//! per deduplication key and drives each run through its stages.

pub mod concurrency;
pub mod pipeline;
pub mod scheduler;
pub mod triggers;

pub use concurrency::{Admission, ConcurrencyController};
pub use pipeline::RunPipeline;
pub use scheduler::{ScheduledRun, Scheduler};
pub use triggers::TriggerMatcher;
