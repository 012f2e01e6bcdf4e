//! Assemble the generate → compile → link pipeline from a [`BuildConfig`]

use std::path::Path;
use std::sync::Arc;

use super::config::{BuildConfig, GeneratorConfig};
use super::template::{CommandTemplate, TemplateContext, TemplateError};
use crate::engine::{
    NativeRoutine, Pipeline, PipelineError, PipelineStage, SharedLibraryRoutine,
};
use crate::engine::process::ExternalCommand;

pub const GENERATE_STAGE: &str = "generate";
pub const COMPILE_STAGE: &str = "compile";
pub const LINK_STAGE: &str = "link";

/// Errors raised while turning a configuration into a pipeline
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Template error in stage '{stage}': {source}")]
    Template {
        stage: String,
        #[source]
        source: TemplateError,
    },
}

pub struct PipelineBuilder<'a> {
    config: &'a BuildConfig,
    generator: Option<Arc<dyn NativeRoutine>>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            generator: None,
        }
    }

    /// Generate IR with `routine` instead of the configured generator
    pub fn with_generator(mut self, routine: Arc<dyn NativeRoutine>) -> Self {
        self.generator = Some(routine);
        self
    }

    pub fn build(&self) -> Result<Pipeline, BuildError> {
        let config = self.config;

        let generate = match (&self.generator, &config.generator) {
            (Some(routine), _) => PipelineStage::native(
                GENERATE_STAGE,
                &config.source,
                &config.ir,
                Arc::clone(routine),
                config.log.clone(),
            ),
            (None, GeneratorConfig::Library(init)) => PipelineStage::native(
                GENERATE_STAGE,
                &config.source,
                &config.ir,
                Arc::new(SharedLibraryRoutine::new(init.clone())),
                config.log.clone(),
            ),
            (None, GeneratorConfig::Command(template)) => PipelineStage::command(
                GENERATE_STAGE,
                &config.source,
                &config.ir,
                self.render(GENERATE_STAGE, template, &config.source, &config.ir)?,
            ),
        };

        let compile = PipelineStage::command(
            COMPILE_STAGE,
            &config.ir,
            &config.object,
            self.render(COMPILE_STAGE, &config.compiler, &config.ir, &config.object)?,
        );

        let link = PipelineStage::command(
            LINK_STAGE,
            &config.object,
            &config.executable,
            self.render(LINK_STAGE, &config.linker, &config.object, &config.executable)?,
        );

        Ok(Pipeline::new(vec![generate, compile, link])?)
    }

    fn render(
        &self,
        stage: &str,
        template: &CommandTemplate,
        input: &Path,
        output: &Path,
    ) -> Result<ExternalCommand, BuildError> {
        let ctx = TemplateContext {
            input,
            output,
            log: self.config.log.as_deref(),
            env: &self.config.env,
        };
        template
            .render(&ctx)
            .map_err(|source| BuildError::Template {
                stage: stage.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::template::CommandArgs;
    use crate::engine::{FnRoutine, StageAction};
    use std::path::PathBuf;

    #[test]
    fn test_default_pipeline_layout() {
        let config = BuildConfig::default();
        let pipeline = PipelineBuilder::new(&config).build().unwrap();
        let stages = pipeline.stages();

        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["generate", "compile", "link"]);
        assert_eq!(pipeline.source(), Path::new("example/main.lx"));
        assert_eq!(pipeline.artifact(), Path::new("example/Main.exe"));

        match &stages[0].action {
            StageAction::Native(native) => {
                assert_eq!(native.log, Some(PathBuf::from("example/log")));
                assert!(native.routine.describe().ends_with("!GenIR"));
            }
            other => panic!("unexpected action: {other:?}"),
        }

        match &stages[1].action {
            StageAction::Command(cmd) => {
                assert_eq!(cmd.program(), "llc");
                assert_eq!(
                    cmd.arguments(),
                    &["-filetype=obj", "-o", "example/main.obj", "example/main.ll"]
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }

        match &stages[2].action {
            StageAction::Command(cmd) => {
                assert_eq!(cmd.program(), "lld-link");
                assert_eq!(
                    cmd.arguments(),
                    &["/OUT:example/Main.exe", "example/main.obj", "/ENTRY:main"]
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_command_generator() {
        let config = BuildConfig {
            generator: GeneratorConfig::Command(CommandTemplate::new(
                "IR-Generator",
                CommandArgs::Line("${{ input }} ${{ output }} ${{ log }}".into()),
            )),
            ..BuildConfig::default()
        };

        let pipeline = PipelineBuilder::new(&config).build().unwrap();
        match &pipeline.stages()[0].action {
            StageAction::Command(cmd) => {
                assert_eq!(
                    cmd.arguments(),
                    &["example/main.lx", "example/main.ll", "example/log"]
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_injected_generator() {
        let config = BuildConfig::default();
        let pipeline = PipelineBuilder::new(&config)
            .with_generator(Arc::new(FnRoutine::new(
                "embedded",
                |_: &Path, _: &Path, _: Option<&Path>| 0,
            )))
            .build()
            .unwrap();

        assert_eq!(pipeline.stages()[0].action.describe(), "embedded");
    }

    #[test]
    fn test_template_error_names_stage() {
        let config = BuildConfig {
            log: None,
            linker: CommandTemplate::new("lld-link", CommandArgs::Line("/LOG:${{ log }}".into())),
            ..BuildConfig::default()
        };

        let err = PipelineBuilder::new(&config).build().err().unwrap();
        assert!(matches!(err, BuildError::Template { ref stage, .. } if stage == "link"));
    }
}
