use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sandbox_orchestrator::config::{OrchestratorConfig, SandboxConfig, DEFAULT_EXECUTION_TIMEOUT};
use sandbox_orchestrator::coordinator::Orchestrator;
use sandbox_orchestrator::protocol::{ExecutionRequest, ExecutionResult, RunSummary, TestOutcome};
use sandbox_orchestrator::shutdown::install_shutdown_handler;
use sandbox_orchestrator::worker::ProcessLauncher;

const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Parser, Debug)]
#[command(name = "sandbox-orchestrator")]
#[command(version)]
#[command(about = "Run Python solutions against pytest suites in an isolated runtime")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a solution module against a pytest file
    Run(RunArgs),

    /// Check that the Python runtime loads
    Check(RuntimeArgs),
}

#[derive(Parser, Debug)]
struct RuntimeArgs {
    /// Python interpreter with pytest installed
    #[arg(long, default_value = "python3")]
    python: PathBuf,

    /// Root for per-runtime working directories (system temp dir by default)
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Extra argument passed to pytest (repeatable)
    #[arg(long = "pytest-arg", allow_hyphen_values = true)]
    pytest_args: Vec<String>,
}

impl RuntimeArgs {
    fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            python: self.python.clone(),
            workdir: self.workdir.clone(),
            pytest_args: self.pytest_args.clone(),
        }
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    runtime: RuntimeArgs,

    /// Solution source file; its stem is the importable module name
    #[arg(long, short = 'm')]
    module: PathBuf,

    /// pytest file to run against the solution
    #[arg(long, short = 't')]
    tests: PathBuf,

    /// Only run `TestLevel<N>` classes
    #[arg(long)]
    level: Option<u32>,

    /// Seconds before the runtime is torn down (1 to 86400)
    #[arg(
        long,
        default_value_t = DEFAULT_EXECUTION_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    timeout_secs: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput<'a> {
    exit_code: i32,
    summary: RunSummary,
    outcomes: &'a [TestOutcome],
}

fn file_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("not a file path: {}", path.display()).into())
}

fn module_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_stem()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("not a module path: {}", path.display()).into())
}

fn print_result(result: &ExecutionResult, output: &OutputFormat) -> serde_json::Result<()> {
    let summary = result.summary();
    match output {
        OutputFormat::Json => {
            let out = RunOutput {
                exit_code: result.exit_code,
                summary,
                outcomes: &result.outcomes,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            if result.outcomes.is_empty() {
                println!("No tests collected (pytest exit code {}).", result.exit_code);
                return Ok(());
            }
            println!("{:<40} {:<8} DURATION", "TEST", "RESULT");
            println!("{}", "-".repeat(60));
            for outcome in &result.outcomes {
                let duration = outcome
                    .duration
                    .map(|d| format!("{:.4}s", d))
                    .unwrap_or_else(|| "-".to_string());
                let verdict = if outcome.passed { "PASS" } else { "FAIL" };
                println!("{:<40} {:<8} {}", outcome.name, verdict, duration);
            }
            for outcome in result.outcomes.iter().filter(|o| !o.passed) {
                if let Some(detail) = &outcome.error_detail {
                    println!();
                    println!("--- {} ---", outcome.name);
                    println!("{}", detail);
                }
            }
            println!();
            println!("{}/{} passed", summary.passed, summary.total);
        }
    }
    Ok(())
}

async fn handle_check(args: RuntimeArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let launcher = Arc::new(ProcessLauncher::new(args.sandbox_config()));
    let orchestrator = Orchestrator::spawn(OrchestratorConfig::default(), launcher);

    let result = orchestrator.initialize().await;
    orchestrator.shutdown().await;
    match result {
        Ok(()) => {
            println!("Runtime ready ({})", args.python.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn handle_run(args: RunArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let source_code = tokio::fs::read_to_string(&args.module).await?;
    let test_spec = tokio::fs::read_to_string(&args.tests).await?;
    let mut request = ExecutionRequest::new(
        module_name(&args.module)?,
        source_code,
        file_name(&args.tests)?,
        test_spec,
    );
    request.level_filter = args.level;

    let config = OrchestratorConfig::default()
        .with_execution_timeout(Duration::from_secs(args.timeout_secs));
    let launcher = Arc::new(ProcessLauncher::new(args.runtime.sandbox_config()));
    let orchestrator = Orchestrator::spawn(config, launcher);
    let _status = orchestrator.subscribe(|status| tracing::debug!(status = %status, "Runtime status"));

    let shutdown = install_shutdown_handler();
    let run = async {
        match orchestrator.initialize().await {
            Ok(()) => orchestrator.submit(request).await,
            Err(e) => Err(e),
        }
    };
    let result = tokio::select! {
        result = run => result,
        _ = shutdown.cancelled() => {
            orchestrator.shutdown().await;
            return Ok(ExitCode::from(130));
        }
    };
    orchestrator.shutdown().await;

    match result {
        Ok(result) => {
            print_result(&result, &args.output)?;
            if result.summary().all_passed {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match args.command {
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::Check(runtime_args) => handle_check(runtime_args).await,
    }
}
