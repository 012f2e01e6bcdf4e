//! # LX Build
//!
//! Build driver for the LX toolchain. A build is a fail-fast pipeline of
//! external tools:
//!
//! 1. **generate** - the native IR generator turns `main.lx` into `main.ll`
//! 2. **compile** - `llc` turns the IR into `main.obj`
//! 3. **link** - the linker produces `Main.exe`
//! 4. optionally the produced program is run and its exit code reported
//!
//! Every tool runs to completion with its output captured; the first stage
//! that fails stops the build and its error text is surfaced verbatim.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lx_build::{BuildConfig, PipelineBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BuildConfig::load("lx-build.yaml")?;
//!     let pipeline = PipelineBuilder::new(&config).build()?;
//!
//!     let report = config.controller().run(&pipeline).await;
//!     println!("Build completed: {}", report.success());
//!     Ok(())
//! }
//! ```

pub mod build;
pub mod engine;

pub use build::{
    BuildConfig, BuildError, CommandArgs, CommandTemplate, GeneratorConfig, LoadError, PipelineBuilder,
    TemplateError,
};
pub use engine::{
    ArtifactRun, CommandRunner, ControllerOptions, ExternalCommand, FnRoutine, NativeInit,
    NativeRoutine, Pipeline, PipelineController, PipelineError, PipelineOutcome, PipelineReport,
    PipelineStage, ProcessResult, ProcessRunner, RunnerError, SharedLibraryRoutine, StageAction,
    StageFailure, StageReport,
};

/// Build with `config` using OS processes
pub async fn run_build(config: &BuildConfig) -> Result<PipelineReport, BuildError> {
    let pipeline = PipelineBuilder::new(config).build()?;
    Ok(config.controller().run(&pipeline).await)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BuildConfig, BuildError, GeneratorConfig, LoadError, PipelineBuilder};
    pub use crate::engine::{
        CommandRunner, ExternalCommand, Pipeline, PipelineController, PipelineError,
        PipelineOutcome, PipelineReport, PipelineStage, ProcessResult, ProcessRunner,
        RunnerError, StageFailure,
    };
    pub use crate::run_build;
}
