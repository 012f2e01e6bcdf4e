//! Pipeline controller - runs stages in order and stops at the first failure
//!
//! For every stage the controller:
//! 1. Checks the declared input exists (optional)
//! 2. Runs the stage's subprocess or native routine
//! 3. Continues on status 0, otherwise stops with `FailedAt`
//!
//! When every stage succeeds the produced artifact can be run once more as an
//! informational step. Its exit code never changes the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::error::RunnerError;
use crate::engine::process::{CommandRunner, ExternalCommand, ProcessResult, ProcessRunner};
use crate::engine::result::{
    ArtifactRun, PipelineOutcome, PipelineReport, StageFailure, StageReport,
};
use crate::engine::stage::{Pipeline, PipelineStage, StageAction};

/// Controller behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Fail a stage whose declared input is missing before launching it
    pub check_inputs: bool,
    /// Execute the final artifact after a completed pipeline
    pub run_artifact: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            check_inputs: true,
            run_artifact: false,
        }
    }
}

pub struct PipelineController {
    runner: Arc<dyn CommandRunner>,
    options: ControllerOptions,
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner::new()))
    }
}

impl PipelineController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            options: ControllerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn check_inputs(mut self, enabled: bool) -> Self {
        self.options.check_inputs = enabled;
        self
    }

    pub fn run_artifact(mut self, enabled: bool) -> Self {
        self.options.run_artifact = enabled;
        self
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    /// Run every stage of `pipeline` in order
    #[instrument(skip(self, pipeline), fields(run_id))]
    pub async fn run(&self, pipeline: &Pipeline) -> PipelineReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        info!(stages = pipeline.stages().len(), "Starting pipeline");

        let mut stages = Vec::with_capacity(pipeline.stages().len());

        for stage in pipeline.stages() {
            if self.options.check_inputs && !exists(&stage.input).await {
                error!(
                    stage = %stage.name,
                    input = %stage.input.display(),
                    "Stage input is missing"
                );
                return PipelineReport {
                    run_id,
                    outcome: PipelineOutcome::FailedAt {
                        stage: stage.name.clone(),
                        failure: StageFailure::MissingInput {
                            path: stage.input.clone(),
                        },
                    },
                    stages,
                    artifact_run: None,
                };
            }

            info!(stage = %stage.name, "Running {}", stage.action.describe());
            let started_at = Utc::now();
            let clock = Instant::now();
            let result = self.execute(stage).await;
            let elapsed_ms = clock.elapsed().as_millis() as u64;

            let mut report = StageReport {
                name: stage.name.clone(),
                input: stage.input.clone(),
                output: stage.output.clone(),
                exit_code: None,
                started_at,
                elapsed_ms,
                artifact_digest: None,
            };

            let failure = match result {
                Ok(result) if result.success() => {
                    info!(
                        stage = %stage.name,
                        elapsed_ms,
                        "{} -> {}",
                        absolute(&stage.input).display(),
                        absolute(&stage.output).display()
                    );
                    report.exit_code = Some(0);
                    report.artifact_digest = digest(&stage.output).await;
                    stages.push(report);
                    continue;
                }
                Ok(result) => {
                    error!(stage = %stage.name, exit_code = result.exit_code, "Stage failed");
                    if !result.stderr.trim().is_empty() {
                        error!(stage = %stage.name, "{}", result.stderr.trim_end());
                    }
                    report.exit_code = Some(result.exit_code);
                    StageFailure::Exited { result }
                }
                Err(e) => {
                    if e.is_launch_failure() {
                        error!(stage = %stage.name, error = %e, "Stage could not be started");
                    } else {
                        error!(stage = %stage.name, error = %e, "Stage did not finish");
                    }
                    StageFailure::from(e)
                }
            };

            stages.push(report);
            return PipelineReport {
                run_id,
                outcome: PipelineOutcome::FailedAt {
                    stage: stage.name.clone(),
                    failure,
                },
                stages,
                artifact_run: None,
            };
        }

        info!("Pipeline completed");

        let artifact_run = if self.options.run_artifact {
            Some(self.execute_artifact(pipeline.artifact()).await)
        } else {
            None
        };

        PipelineReport {
            run_id,
            outcome: PipelineOutcome::Completed,
            stages,
            artifact_run,
        }
    }

    async fn execute(&self, stage: &PipelineStage) -> Result<ProcessResult, RunnerError> {
        match &stage.action {
            StageAction::Command(command) => self.runner.run(command).await,
            StageAction::Native(native) => {
                let routine = Arc::clone(&native.routine);
                let program = routine.describe();
                let input = stage.input.clone();
                let output = stage.output.clone();
                let log = native.log.clone();

                let status = tokio::task::spawn_blocking(move || {
                    routine.invoke(&input, &output, log.as_deref())
                })
                .await
                .map_err(|e| RunnerError::Io {
                    program,
                    source: std::io::Error::other(e.to_string()),
                })??;

                Ok(ProcessResult::from_status(status))
            }
        }
    }

    async fn execute_artifact(&self, artifact: &Path) -> ArtifactRun {
        let command = artifact_command(artifact);
        info!(program = %command, "Running produced executable");

        match self.runner.run(&command).await {
            Ok(result) => {
                info!(exit_code = result.exit_code, "Produced executable exited");
                ArtifactRun {
                    path: artifact.to_path_buf(),
                    exit_code: Some(result.exit_code),
                    error: None,
                    stdout: result.stdout,
                    stderr: result.stderr,
                }
            }
            Err(e) => {
                warn!(error = %e, "Produced executable could not be run");
                ArtifactRun {
                    path: artifact.to_path_buf(),
                    exit_code: None,
                    error: Some(e.to_string()),
                    stdout: String::new(),
                    stderr: String::new(),
                }
            }
        }
    }
}

/// A bare file name would be looked up on the search path; run it from the
/// working directory instead.
fn artifact_command(artifact: &Path) -> ExternalCommand {
    let program = if artifact.is_relative() && artifact.components().count() == 1 {
        Path::new(".").join(artifact)
    } else {
        artifact.to_path_buf()
    };
    ExternalCommand::new(program.display().to_string())
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

async fn digest(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(hex::encode(Sha256::digest(&bytes))),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No artifact to digest");
            None
        }
    }
}
