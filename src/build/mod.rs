//! Build configuration
//!
//! - `config` - BuildConfig loaded from lx-build.yaml
//! - `loader` - Configuration file discovery and parsing
//! - `template` - `${{ }}` placeholders in tool command lines
//! - `pipeline` - Turns a BuildConfig into the generate → compile → link pipeline

pub mod config;
pub mod loader;
pub mod pipeline;
pub mod template;

pub use config::{BuildConfig, GeneratorConfig};
pub use loader::{find_config, LoadError, CONFIG_FILE_NAMES};
pub use pipeline::{BuildError, PipelineBuilder, COMPILE_STAGE, GENERATE_STAGE, LINK_STAGE};
pub use template::{CommandArgs, CommandTemplate, TemplateContext, TemplateError};
