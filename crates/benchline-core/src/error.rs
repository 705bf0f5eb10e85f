//! Error types for Benchline.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Build errors
    #[error("Build failed with exit code {exit_code}:\n{captured_output}")]
    Build {
        exit_code: i32,
        captured_output: String,
    },

    #[error("Build produced no output for target: {target}")]
    MissingTarget { target: String },

    // Staging errors
    #[error("Failed to stage artifact for target {target}: {reason}")]
    Normalize { target: String, reason: String },

    // Dispatch errors
    #[error("Benchmark run timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("Benchmark run failed with exit code {exit_code}")]
    RunFailed { exit_code: i32, payload: String },

    // Run lifecycle
    #[error("Run cancelled: {reason}")]
    RunCancelled { reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error aborts the run (as opposed to a cooperative stop).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::RunCancelled { .. })
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Build { .. } | Error::MissingTarget { .. } => "build_error",
            Error::Normalize { .. } => "normalize_error",
            Error::Timeout { .. } => "timeout_error",
            Error::RunFailed { .. } => "run_failed",
            Error::RunCancelled { .. } => "cancelled",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Config(_) | Error::SecretNotFound(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
