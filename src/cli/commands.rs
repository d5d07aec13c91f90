//! CLI command definitions for ir-forge.
//!
//! `serve` runs the HTTP server; `compile` runs one pipeline locally and
//! prints the same JSON body the server would return; `passes` lists the
//! obfuscation passes in application order.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::pipeline::{ObfuscationOptions, PipelineConfig, PipelineOrchestrator, PASS_REGISTRY};

/// Obfuscation pipeline server for LLVM IR.
#[derive(Parser)]
#[command(name = "ir-forge")]
#[command(about = "Compile, obfuscate and run C/C++ snippets through LLVM")]
#[command(version)]
#[command(
    long_about = "ir-forge compiles a source snippet to LLVM IR, applies a chain of obfuscation passes, links and runs the result, and reports the IR after every stage.\n\nToolchain commands are configured through IRFORGE_* environment variables.\n\nExample usage:\n  ir-forge compile hello.cpp --pass pluto_flattening --pass pluto_substitution"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve(ServeArgs),

    /// Run one source file through the pipeline and print the result.
    Compile(CompileArgs),

    /// List the available obfuscation passes.
    Passes,
}

/// Arguments for the serve command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on; overrides IRFORGE_BIND_ADDR and PORT.
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Arguments for the compile command.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Source file to compile.
    pub file: PathBuf,

    /// Toolchain version tag (defaults to IRFORGE_DEFAULT_LLVM_VERSION).
    #[arg(short = 'v', long)]
    pub llvm_version: Option<String>,

    /// Obfuscation pass to enable, by option key. Repeatable; passes always
    /// run in registry order.
    #[arg(short, long = "pass", value_name = "KEY")]
    pub passes: Vec<String>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Compile(args) => run_compile_command(args).await,
        Commands::Passes => {
            print!("{}", render_pass_table());
            Ok(())
        }
    }
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env().context("Invalid configuration")?;
    if let Some(bind) = args.bind {
        config = config.with_bind_addr(bind);
    }

    crate::server::serve(config).await?;
    Ok(())
}

async fn run_compile_command(args: CompileArgs) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let config = PipelineConfig::from_env().context("Invalid configuration")?;
    let orchestrator = PipelineOrchestrator::new(config)?;

    info!(
        file = %args.file.display(),
        passes = ?args.passes,
        "Compiling"
    );

    let response = orchestrator
        .compile(Some(code), args.llvm_version, options_from_passes(&args.passes))
        .await;

    println!("{}", serde_json::to_string_pretty(response.body())?);

    if !response.is_success() {
        anyhow::bail!("Pipeline failed with status {}", response.status());
    }
    Ok(())
}

fn options_from_passes(passes: &[String]) -> ObfuscationOptions {
    passes.iter().fold(
        ObfuscationOptions::new().with_enabled(!passes.is_empty()),
        |options, pass| options.with_flag(pass.clone(), true),
    )
}

fn render_pass_table() -> String {
    let width = PASS_REGISTRY
        .iter()
        .map(|spec| spec.name.len())
        .max()
        .unwrap_or(0);

    PASS_REGISTRY
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            format!(
                "{}. {:<width$}  {:<4} {}\n",
                i + 1,
                spec.name,
                spec.pass,
                spec.label,
                width = width
            )
        })
        .collect()
}
