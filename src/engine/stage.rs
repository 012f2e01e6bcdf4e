//! Pipeline stages
//!
//! A stage is a named step with a declared input and output artifact. What it
//! runs is a [`StageAction`]: a subprocess or a direct native call. Both report
//! an integer status, and the controller treats them the same way.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::engine::error::PipelineError;
use crate::engine::native::NativeRoutine;
use crate::engine::process::ExternalCommand;

/// A call into a native routine
#[derive(Clone)]
pub struct NativeInvocation {
    pub routine: Arc<dyn NativeRoutine>,
    pub log: Option<PathBuf>,
}

impl fmt::Debug for NativeInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeInvocation")
            .field("routine", &self.routine.describe())
            .field("log", &self.log)
            .finish()
    }
}

/// What a stage executes
#[derive(Debug, Clone)]
pub enum StageAction {
    Command(ExternalCommand),
    Native(NativeInvocation),
}

impl StageAction {
    pub fn describe(&self) -> String {
        match self {
            StageAction::Command(cmd) => cmd.to_string(),
            StageAction::Native(native) => native.routine.describe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineStage {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub action: StageAction,
}

impl PipelineStage {
    pub fn command(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        command: ExternalCommand,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            action: StageAction::Command(command),
        }
    }

    pub fn native(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        routine: Arc<dyn NativeRoutine>,
        log: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            action: StageAction::Native(NativeInvocation { routine, log }),
        }
    }
}

/// An ordered, chain-checked list of stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    /// Validate and wrap `stages`.
    ///
    /// Each stage's input must be the previous stage's output and names must
    /// be unique.
    pub fn new(stages: Vec<PipelineStage>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut names = HashSet::new();
        for stage in &stages {
            if !names.insert(stage.name.as_str()) {
                return Err(PipelineError::DuplicateStage(stage.name.clone()));
            }
        }

        for pair in stages.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if !same_artifact(&prev.output, &next.input) {
                return Err(PipelineError::BrokenChain {
                    stage: next.name.clone(),
                    expected: prev.output.clone(),
                    found: next.input.clone(),
                });
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Input of the first stage
    pub fn source(&self) -> &Path {
        &self.stages[0].input
    }

    /// Output of the last stage
    pub fn artifact(&self) -> &Path {
        &self.stages[self.stages.len() - 1].output
    }
}

/// `./main.ll` and `main.ll` name the same file
fn same_artifact(a: &Path, b: &Path) -> bool {
    fn spelled(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect::<Vec<_>>()
    }
    spelled(a) == spelled(b)
}
