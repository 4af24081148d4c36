use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use verity_api::ApiClients;
use verity_engine::{ExecutionSettings, ReqwestTransport, RunContext, RunOptions, generate_run_id, load_suites, plan_suites, run_isolated, run_suites};
use verity_types::{RunEvent, RunReport, SuiteDefinition};
use verity_util::{check_endpoint_references, load_config};

mod render;

/// Exit code for configuration, suite-loading and planning errors.
const EXIT_CONFIGURATION_ERROR: u8 = 2;
/// Exit code when at least one step failed.
const EXIT_STEP_FAILURES: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "verity", version, about = "Contract-verification harness for HTTP APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run suites against the configured endpoints.
    Run(RunArgs),
    /// Print the execution order without sending requests.
    Plan(SuiteArgs),
    /// List suites and their steps.
    List(SuiteArgs),
}

#[derive(Debug, Args)]
struct SuiteArgs {
    /// Suite files (YAML or JSON). Suites run in the order given.
    #[arg(short = 'f', long = "file", required = true, num_args = 1..)]
    files: Vec<PathBuf>,
    /// Only include these suites.
    #[arg(long = "suite")]
    suites: Vec<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    input: SuiteArgs,
    /// Harness configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the JSON run report here.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Run suites concurrently, each with its own variable store.
    #[arg(long)]
    isolated: bool,
    /// Override the generated run identifier.
    #[arg(long)]
    run_id: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plan(args) => plan(&args).map(|_| ExitCode::SUCCESS),
        Command::List(args) => list(&args).map(|_| ExitCode::SUCCESS),
    };
    outcome.unwrap_or_else(|error| {
        error!(error = %format!("{error:#}"), "verity stopped before running");
        eprintln!("error: {error:#}");
        ExitCode::from(EXIT_CONFIGURATION_ERROR)
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref()).context("failed to load configuration")?;
    let suites = select_suites(&args.input)?;
    check_endpoint_references(&config, suites.iter().map(|suite| (suite.suite.as_str(), suite.endpoint.as_str())))?;
    let transport = ReqwestTransport::new(ApiClients::from_config(&config)?);

    let mut context = RunContext::from_config(&config, args.run_id.clone().unwrap_or_else(generate_run_id));
    let (event_tx, event_rx) = unbounded_channel();
    let options = RunOptions {
        settings: ExecutionSettings::from(&config),
        event_tx: Some(event_tx),
        cancel: CancellationToken::new(),
    };
    watch_for_interrupt(options.cancel.clone());
    let printer = tokio::spawn(print_progress(event_rx));

    info!(run_id = %context.run_id, suites = suites.len(), isolated = args.isolated, "starting run");
    let report = if args.isolated {
        run_isolated(suites, &context, Arc::new(transport), options).await?
    } else {
        let report = run_suites(&suites, &mut context, &transport, &options).await;
        drop(options);
        report?
    };
    let _ = printer.await;

    println!("{}", render::summary_line(&report));
    if let Some(path) = &args.report {
        write_report(path, &report)?;
        info!(path = %path.display(), "run report written");
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_STEP_FAILURES)
    })
}

fn plan(args: &SuiteArgs) -> Result<()> {
    let suites = select_suites(args)?;
    let suite_refs: Vec<&SuiteDefinition> = suites.iter().collect();
    let plan = plan_suites(&suite_refs)?;
    for line in render::plan_lines(&plan) {
        println!("{line}");
    }
    Ok(())
}

fn list(args: &SuiteArgs) -> Result<()> {
    let mut bundle = load_suites(&args.files)?;
    bundle.suites = filter_suites(bundle.suites, &args.suites)?;
    for line in render::list_lines(&bundle) {
        println!("{line}");
    }
    Ok(())
}

fn select_suites(args: &SuiteArgs) -> Result<Vec<SuiteDefinition>> {
    let bundle = load_suites(&args.files)?;
    filter_suites(bundle.suites, &args.suites)
}

/// Keeps only the named suites, in bundle order. An empty filter keeps all.
fn filter_suites(suites: Vec<SuiteDefinition>, only: &[String]) -> Result<Vec<SuiteDefinition>> {
    if only.is_empty() {
        return Ok(suites);
    }
    for wanted in only {
        if !suites.iter().any(|suite| &suite.suite == wanted) {
            bail!("suite '{wanted}' not found in the given files");
        }
    }
    Ok(suites.into_iter().filter(|suite| only.contains(&suite.suite)).collect())
}

fn watch_for_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            cancel.cancel();
        }
    });
}

async fn print_progress(mut event_rx: UnboundedReceiver<RunEvent>) {
    while let Some(event) = event_rx.recv().await {
        if let RunEvent::StepFinished { report, .. } = event {
            for line in render::step_block(&report) {
                println!("{line}");
            }
        }
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    std::fs::write(path, json).with_context(|| format!("failed to write run report to {}", path.display()))
}
