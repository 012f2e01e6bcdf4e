//! Engine error types

use std::path::PathBuf;
use std::time::Duration;


/// Errors raised while supervising a single invocation.
///
/// A non-zero exit code is never one of these: it is returned as data in
/// [`ProcessResult`](super::process::ProcessResult).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Native routine unavailable: {0}")]
    NativeLoad(String),

    #[error("Invalid argument for '{program}': {message}")]
    InvalidArgument { program: String, message: String },

    #[error("'{program}' did not finish within {}ms", timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    #[error("IO error while supervising '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// True when the program never got to run at all.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            RunnerError::Launch { .. }
                | RunnerError::NativeLoad(_)
                | RunnerError::InvalidArgument { .. }
        )
    }
}

/// Errors raised while assembling a pipeline, before any stage runs
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline has no stages")]
    Empty,

    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error(
        "Broken chain at stage '{stage}': expected input {}, found {}",
        expected.display(),
        found.display()
    )]
    BrokenChain {
        stage: String,
        expected: PathBuf,
        found: PathBuf,
    },
}

/// A command line with an opening quote that is never closed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unterminated quote in: {0}")]
pub struct UnterminatedQuote(pub String);
