//! Build execution engine
//!
//! This module contains:
//! - `process` - Runs one external program with captured output
//! - `native` - The native IR generator entry point
//! - `stage` - Stage definitions and the chain-checked pipeline
//! - `controller` - The fail-fast pipeline controller
//! - `result` - Outcome and report types
//! - `error` - Engine error types

pub mod controller;
pub mod error;
pub mod native;
pub mod process;
pub mod result;
pub mod stage;

pub use controller::{ControllerOptions, PipelineController};
pub use error::{PipelineError, RunnerError, UnterminatedQuote};
pub use native::{FnRoutine, NativeInit, NativeRoutine, SharedLibraryRoutine};
pub use process::{split_args, CommandRunner, ExternalCommand, ProcessResult, ProcessRunner};
pub use result::{ArtifactRun, PipelineOutcome, PipelineReport, StageFailure, StageReport};
pub use stage::{NativeInvocation, Pipeline, PipelineStage, StageAction};
