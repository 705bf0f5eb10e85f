//! Exit status mapping.

use benchline_core::Error;
use benchline_core::run::RunOutcome;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CANCELLED: u8 = 3;
pub const EXIT_BUILD_ERROR: u8 = 10;
pub const EXIT_NORMALIZE_ERROR: u8 = 11;
pub const EXIT_TIMEOUT: u8 = 12;
pub const EXIT_RUN_FAILED: u8 = 13;

/// Exit status for a single run outcome.
pub fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::NotAdmitted | RunOutcome::Succeeded { .. } => EXIT_OK,
        RunOutcome::Cancelled { .. } => EXIT_CANCELLED,
        RunOutcome::Failed { error, .. } => match error {
            Error::Build { .. } | Error::MissingTarget { .. } => EXIT_BUILD_ERROR,
            Error::Normalize { .. } => EXIT_NORMALIZE_ERROR,
            Error::Timeout { .. } => EXIT_TIMEOUT,
            Error::RunFailed { .. } => EXIT_RUN_FAILED,
            _ => EXIT_ERROR,
        },
    }
}

/// Exit status for a batch of outcomes in delivery order.
///
/// The first failure wins. Without failures the batch exits with the
/// cancelled status only if no run succeeded, since superseded runs are
/// expected whenever the same key appears more than once.
pub fn batch_exit_code(outcomes: &[RunOutcome]) -> u8 {
    if let Some(failed) = outcomes.iter().find(|o| !o.is_success()) {
        return exit_code(failed);
    }

    let succeeded = outcomes
        .iter()
        .any(|o| matches!(o, RunOutcome::Succeeded { .. }));
    let cancelled = outcomes
        .iter()
        .any(|o| matches!(o, RunOutcome::Cancelled { .. }));

    if cancelled && !succeeded {
        EXIT_CANCELLED
    } else {
        EXIT_OK
    }
}
