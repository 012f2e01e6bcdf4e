use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lx_build::prelude::*;
use lx_build::StageAction;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lx-build")]
#[command(about = "Build LX programs: generate IR, compile, link and run", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the build configuration (default: ./lx-build.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build pipeline (the default command)
    Build {
        /// Do not run the produced executable
        #[arg(long)]
        no_run: bool,

        /// Kill any tool that runs longer than this many seconds
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Check the configuration and toolchain without building
    Validate,

    /// Print the effective configuration
    ShowConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "lx_build=debug"
    } else {
        "lx_build=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "lx-build failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = load_config(cli.config)?;

    match cli.command.unwrap_or(Commands::Build {
        no_run: false,
        timeout: None,
    }) {
        Commands::Build { no_run, timeout } => {
            if no_run {
                config.run = false;
            }
            if timeout.is_some() {
                config.timeout_secs = timeout;
            }
            build(&config, cli.json).await
        }
        Commands::Validate => validate(&config),
        Commands::ShowConfig => show_config(&config, cli.json),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BuildConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            tracing::debug!(config = %path.display(), "Using config");
            Ok(BuildConfig::load(&path)?)
        }
        None => {
            let (config, found) = BuildConfig::discover(".")?;
            if let Some(path) = found {
                tracing::debug!(config = %path.display(), "Using config");
            }
            Ok(config)
        }
    }
}

async fn build(config: &BuildConfig, json: bool) -> anyhow::Result<bool> {
    let pipeline = PipelineBuilder::new(config).build()?;

    if !json {
        println!(
            "Building: {} -> {}\n",
            pipeline.source().display(),
            pipeline.artifact().display()
        );
    }

    let report = config.controller().run(&pipeline).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if let PipelineOutcome::FailedAt { stage, failure } = &report.outcome {
        eprintln!("\nStage '{}' {}", stage, failure);
        let diagnostic = failure.diagnostic();
        if diagnostic != failure.to_string() {
            eprintln!("{}", diagnostic.trim_end());
        }
    }

    Ok(report.success())
}

fn validate(config: &BuildConfig) -> anyhow::Result<bool> {
    let mut valid = true;

    match PipelineBuilder::new(config).build() {
        Ok(pipeline) => {
            let names: Vec<_> = pipeline.stages().iter().map(|s| s.name.as_str()).collect();
            println!("✓ pipeline: {}", names.join(" -> "));
            for stage in pipeline.stages() {
                if let StageAction::Command(cmd) = &stage.action {
                    println!("    {}: {}", stage.name, cmd);
                }
            }
        }
        Err(e) => {
            println!("✗ pipeline: {}", e);
            valid = false;
        }
    }

    if config.source.exists() {
        println!("✓ source: {}", config.source.display());
    } else {
        println!("✗ source not found: {}", config.source.display());
        valid = false;
    }

    if let GeneratorConfig::Library(init) = &config.generator {
        let library = init.library_path();
        if library.is_file() {
            println!("✓ generator library: {}", library.display());
        } else {
            println!("✗ generator library not found: {}", library.display());
            valid = false;
        }
    }

    for program in config.programs() {
        match which::which(program) {
            Ok(path) => println!("✓ {} ({})", program, path.display()),
            Err(_) => {
                println!("✗ {} not found", program);
                valid = false;
            }
        }
    }

    Ok(valid)
}

fn show_config(config: &BuildConfig, json: bool) -> anyhow::Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", serde_yaml::to_string(config)?);
    }
    Ok(true)
}

fn print_report(report: &PipelineReport) {
    println!("=== Build Result ===\n");
    println!("Success: {}", if report.success() { "YES" } else { "NO" });
    println!("Run ID: {}\n", report.run_id);

    for stage in &report.stages {
        let status = if stage.exit_code == Some(0) { "✓" } else { "✗" };
        println!(
            "{} {}: {} -> {} ({}ms)",
            status,
            stage.name,
            stage.input.display(),
            stage.output.display(),
            stage.elapsed_ms
        );
    }

    if let PipelineOutcome::FailedAt { stage, failure } = &report.outcome {
        if report.stage(stage).is_none() {
            println!("✗ {}: {}", stage, failure);
        }
    }

    if let Some(run) = &report.artifact_run {
        println!();
        if !run.stdout.is_empty() {
            print!("{}", run.stdout);
            if !run.stdout.ends_with('\n') {
                println!();
            }
        }
        if !run.stderr.is_empty() {
            eprint!("{}", run.stderr);
            if !run.stderr.ends_with('\n') {
                eprintln!();
            }
        }
        match (run.exit_code, &run.error) {
            (Some(code), _) => println!("{} exited with code {}", run.path.display(), code),
            (None, Some(error)) => println!("{} could not be run: {}", run.path.display(), error),
            (None, None) => println!("{} did not report an exit code", run.path.display()),
        }
    }
}
