//! Pipeline outcome and report types

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::RunnerError;
use crate::engine::process::ProcessResult;

/// Why a stage stopped the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// The program ran and exited non-zero
    Exited { result: ProcessResult },
    /// The program or native routine could not be started at all
    LaunchFailure { message: String },
    /// The program was killed after exceeding its time limit
    Timeout { after_ms: u64 },
    /// The program started but could not be supervised to completion
    Aborted { message: String },
    /// The stage's declared input did not exist when it was due to run
    MissingInput { path: PathBuf },
}

impl StageFailure {
    /// Exit code when the program actually ran
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StageFailure::Exited { result } => Some(result.exit_code),
            _ => None,
        }
    }

    /// Text to show the user: the tool's own stderr when it ran, otherwise
    /// a description of why it never finished.
    pub fn diagnostic(&self) -> String {
        match self {
            StageFailure::Exited { result } if !result.stderr.trim().is_empty() => {
                result.stderr.clone()
            }
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageFailure::Exited { result } => {
                write!(f, "exited with code {}", result.exit_code)
            }
            StageFailure::LaunchFailure { message } => {
                write!(f, "could not be started: {}", message)
            }
            StageFailure::Timeout { after_ms } => {
                write!(f, "timed out after {}ms and was killed", after_ms)
            }
            StageFailure::Aborted { message } => write!(f, "aborted: {}", message),
            StageFailure::MissingInput { path } => {
                write!(f, "input file does not exist: {}", path.display())
            }
        }
    }
}

impl From<RunnerError> for StageFailure {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Timeout { timeout, .. } => StageFailure::Timeout {
                after_ms: timeout.as_millis() as u64,
            },
            RunnerError::Io { .. } => StageFailure::Aborted {
                message: err.to_string(),
            },
            other => StageFailure::LaunchFailure {
                message: other.to_string(),
            },
        }
    }
}

/// Terminal state of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed,
    FailedAt { stage: String, failure: StageFailure },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed)
    }

    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Completed => None,
            PipelineOutcome::FailedAt { stage, .. } => Some(stage),
        }
    }
}

/// Record of one stage that was started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
    /// `None` when the stage never produced an exit code
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// SHA-256 of the output artifact after a successful stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_digest: Option<String>,
}

/// Result of running the produced executable; informational only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRun {
    pub path: PathBuf,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

/// Result of a pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub outcome: PipelineOutcome,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_run: Option<ArtifactRun>,
}

impl PipelineReport {
    pub fn success(&self) -> bool {
        self.outcome.is_completed()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_diagnostic_prefers_tool_stderr() {
        let failure = StageFailure::Exited {
            result: ProcessResult {
                exit_code: 1,
                stderr: "llc: main.ll:4:1: error: expected instruction\n".into(),
                stdout: String::new(),
            },
        };
        assert_eq!(failure.exit_code(), Some(1));
        assert_eq!(
            failure.diagnostic(),
            "llc: main.ll:4:1: error: expected instruction\n"
        );

        let silent = StageFailure::Exited {
            result: ProcessResult::from_status(-1),
        };
        assert_eq!(silent.diagnostic(), "exited with code -1");
    }

    #[test]
    fn test_runner_error_mapping() {
        let launch: StageFailure = RunnerError::Launch {
            program: "llc".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert!(matches!(launch, StageFailure::LaunchFailure { .. }));
        assert!(launch.diagnostic().starts_with("could not be started"));
        assert_eq!(launch.exit_code(), None);

        let timeout: StageFailure = RunnerError::Timeout {
            program: "llc".into(),
            timeout: Duration::from_secs(2),
        }
        .into();
        assert_eq!(timeout, StageFailure::Timeout { after_ms: 2000 });
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::FailedAt {
            stage: "link".into(),
            failure: StageFailure::MissingInput {
                path: PathBuf::from("main.obj"),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed_at");
        assert_eq!(json["stage"], "link");
        assert_eq!(json["failure"]["kind"], "missing_input");
        assert_eq!(outcome.failed_stage(), Some("link"));

        let done = serde_json::to_value(PipelineOutcome::Completed).unwrap();
        assert_eq!(done["status"], "completed");
    }
}
