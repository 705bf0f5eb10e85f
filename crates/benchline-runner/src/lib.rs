//! Build, staging and benchmark dispatch for Benchline.

pub mod build;
pub mod cargo;
pub mod command;
pub mod dispatch;
pub mod normalize;
pub mod process;

pub use build::BuildStage;
pub use cargo::CargoToolchain;
pub use command::CommandBenchmarkService;
pub use dispatch::RunDispatcher;
pub use normalize::{ArtifactNormalizer, Candidate, find_candidates};
pub use process::{CaptureOptions, CapturedOutput, OutputLine, OutputStream, run_captured};
