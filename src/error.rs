use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that stop a run before (or instead of) producing output.
///
/// Per-preset engine failures are not represented here; they are folded into
/// [`crate::engine::CompressionAttempt`] and never abort a run.
#[derive(Error, Debug)]
pub enum SqueezeError {
    /// No usable Ghostscript binary.
    #[error("compression engine not found (tried: {tried})")]
    EngineNotFound { tried: String },

    #[error("input does not exist: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("input is not a regular file: {}", .0.display())]
    InputNotFile(PathBuf),

    #[error("target size must be a positive number of megabytes, got {0}")]
    InvalidTarget(String),

    #[error("an empty password was supplied")]
    EmptyCredential,

    #[error("output path refers to the input file: {}", .0.display())]
    OutputIsInput(PathBuf),

    #[error("invalid ladder: {0}")]
    InvalidLadder(String),

    /// Every preset failed.
    #[error("{}", all_failed_message(.last_error, .access_control_suspected))]
    AllPresetsFailed {
        last_error: String,
        access_control_suspected: bool,
    },
}

fn all_failed_message(last_error: &str, access_control_suspected: &bool) -> String {
    let mut msg = format!("compression failed at every quality preset; last error: {last_error}");
    if *access_control_suspected {
        msg.push_str("\nthe document looks password-protected; retry with --password");
    }
    msg
}
