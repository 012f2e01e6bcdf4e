//! Argument templating for tool command lines
//!
//! Supports:
//! - ${{ input }} - the stage's declared input path
//! - ${{ output }} - the stage's declared output path
//! - ${{ log }} - the configured log file
//! - ${{ env.NAME }} - a configured variable, falling back to the process environment
//!
//! Pre-joined argument strings are split before substitution, so a substituted
//! path always stays a single argument even when it contains spaces.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::engine::error::UnterminatedQuote;
use crate::engine::process::{split_args, ExternalCommand};

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").unwrap());

/// Errors that can occur while rendering a command template
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid placeholder syntax: {0}")]
    InvalidSyntax(String),

    #[error("No value configured for: {0}")]
    MissingValue(String),

    #[error(transparent)]
    UnterminatedQuote(#[from] UnterminatedQuote),
}

/// Values available to placeholders
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub log: Option<&'a Path>,
    pub env: &'a HashMap<String, String>,
}

/// Arguments given either as one command-line string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandArgs {
    Line(String),
    List(Vec<String>),
}

impl Default for CommandArgs {
    fn default() -> Self {
        CommandArgs::List(Vec::new())
    }
}

/// A tool invocation with placeholders, rendered once per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: CommandArgs,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: CommandArgs) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> Result<ExternalCommand, TemplateError> {
        let raw = match &self.args {
            CommandArgs::Line(line) => split_args(line)?,
            CommandArgs::List(list) => list.clone(),
        };

        let args = raw
            .iter()
            .map(|arg| render(arg, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ExternalCommand::new(render(&self.program, ctx)?).args(args))
    }
}

/// Substitute every placeholder in `input`
pub fn render(input: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    if PLACEHOLDER_REGEX.replace_all(input, "").contains("${{") {
        return Err(TemplateError::InvalidSyntax(input.to_string()));
    }

    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for cap in PLACEHOLDER_REGEX.captures_iter(input) {
        let Some(whole) = cap.get(0) else { continue };
        result.push_str(&input[last..whole.start()]);
        result.push_str(&evaluate(cap[1].trim(), ctx)?);
        last = whole.end();
    }
    result.push_str(&input[last..]);

    Ok(result)
}

fn evaluate(expr: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    match expr {
        "" => Err(TemplateError::InvalidSyntax("${{ }}".to_string())),
        "input" => Ok(ctx.input.display().to_string()),
        "output" => Ok(ctx.output.display().to_string()),
        "log" => ctx
            .log
            .map(|p| p.display().to_string())
            .ok_or_else(|| TemplateError::MissingValue("log".to_string())),
        _ => match expr.strip_prefix("env.") {
            Some(name) if !name.is_empty() => ctx
                .env
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .ok_or_else(|| TemplateError::UnknownVariable(expr.to_string())),
            Some(_) => Err(TemplateError::InvalidSyntax(format!(
                "env expressions must be env.VAR_NAME, got: {}",
                expr
            ))),
            None => Err(TemplateError::UnknownVariable(expr.to_string())),
        },
    }
}
