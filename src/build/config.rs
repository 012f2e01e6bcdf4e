//! Build configuration
//!
//! Configuration for the build driver, loaded from lx-build.yaml. Every key is
//! optional; the defaults build the bundled example:
//!
//! ```yaml
//! source: example/main.lx
//! ir: example/main.ll
//! object: example/main.obj
//! executable: example/Main.exe
//! log: example/log
//! run: true
//! timeout_secs: 120
//!
//! generator:
//!   library:
//!     dir: bin/x64/Release
//!     name: Generator
//!     symbol: GenIR
//!
//! compiler:
//!   program: llc
//!   args: '-filetype=obj -o "${{ output }}" "${{ input }}"'
//!
//! linker:
//!   program: lld-link
//!   args: '/OUT:${{ output }} ${{ input }} /ENTRY:main'
//! ```
//!
//! Relative paths resolve against the working directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::loader::{find_config, load_yaml, LoadError};
use super::template::{CommandArgs, CommandTemplate};
use crate::engine::{ControllerOptions, NativeInit, PipelineController, ProcessRunner};

/// How the IR generator is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorConfig {
    /// Direct call into a shared library
    Library(NativeInit),
    /// Standalone generator executable
    Command(CommandTemplate),
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig::Library(NativeInit::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_source")]
    pub source: PathBuf,

    #[serde(default = "default_ir")]
    pub ir: PathBuf,

    #[serde(default = "default_object")]
    pub object: PathBuf,

    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Log file handed to the generator; `null` disables it
    #[serde(default = "default_log")]
    pub log: Option<PathBuf>,

    /// Run the produced executable after a successful build
    #[serde(default = "default_true")]
    pub run: bool,

    /// Fail a stage early when its input file is missing
    #[serde(default = "default_true")]
    pub check_inputs: bool,

    /// Per-process time limit; unlimited when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub generator: GeneratorConfig,

    #[serde(default = "default_compiler")]
    pub compiler: CommandTemplate,

    #[serde(default = "default_linker")]
    pub linker: CommandTemplate,

    /// Extra `${{ env.NAME }}` values for command templates
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_source() -> PathBuf {
    PathBuf::from("example/main.lx")
}

fn default_ir() -> PathBuf {
    PathBuf::from("example/main.ll")
}

fn default_object() -> PathBuf {
    PathBuf::from("example/main.obj")
}

fn default_executable() -> PathBuf {
    PathBuf::from("example/Main.exe")
}

fn default_log() -> Option<PathBuf> {
    Some(PathBuf::from("example/log"))
}

fn default_true() -> bool {
    true
}

fn default_compiler() -> CommandTemplate {
    CommandTemplate::new(
        "llc",
        CommandArgs::Line(r#"-filetype=obj -o "${{ output }}" "${{ input }}""#.to_string()),
    )
}

fn default_linker() -> CommandTemplate {
    CommandTemplate::new(
        "lld-link",
        CommandArgs::Line("/OUT:${{ output }} ${{ input }} /ENTRY:main".to_string()),
    )
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            ir: default_ir(),
            object: default_object(),
            executable: default_executable(),
            log: default_log(),
            run: true,
            check_inputs: true,
            timeout_secs: None,
            generator: GeneratorConfig::default(),
            compiler: default_compiler(),
            linker: default_linker(),
            env: HashMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        load_yaml(path.as_ref())
    }

    /// Load the configuration file in `dir`, or fall back to defaults.
    ///
    /// Returns the path that was loaded, if any.
    pub fn discover(dir: impl AsRef<Path>) -> Result<(Self, Option<PathBuf>), LoadError> {
        match find_config(dir.as_ref()) {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            check_inputs: self.check_inputs,
            run_artifact: self.run,
        }
    }

    /// Controller backed by OS processes with this configuration's limits
    pub fn controller(&self) -> PipelineController {
        let mut runner = ProcessRunner::new();
        if let Some(timeout) = self.timeout() {
            runner = runner.with_timeout(timeout);
        }
        PipelineController::new(Arc::new(runner)).with_options(self.controller_options())
    }

    /// Every program the pipeline will launch
    pub fn programs(&self) -> Vec<&str> {
        let mut programs = Vec::new();
        if let GeneratorConfig::Command(template) = &self.generator {
            programs.push(template.program.as_str());
        }
        programs.push(self.compiler.program.as_str());
        programs.push(self.linker.program.as_str());
        programs
    }
}
