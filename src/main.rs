use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use storybatch::config::{Configuration, RunnerSettings};
use storybatch::context::RunContext;
use storybatch::paths::{PathResolver, ResolvedBatches};
use storybatch::report::{generate_run_id, EventWriter, JsonViewGenerator, RunStatistics};
use storybatch::reporter::{LoggingReporter, ReporterChain, RunContextReporter, StoryReporter};
use storybatch::runtime::{DryRunStoryRunner, ExecutionRuntime, ProcessStoryRunner, StoryManager};
use storybatch::scheduler::{BatchScheduler, BatchStatus, RunSummary};
use storybatch::variables::{ScopedVariables, VariableScopeReporter};

#[derive(Parser)]
#[command(name = "storybatch", version, about = "Run story tests in ordered batches")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stories each batch would run
    Plan,
    /// Run all batches
    Run {
        /// Walk stories through the reporters without executing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let configuration = Configuration::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    let batches = PathResolver::new(&configuration.base_dir)
        .find_all(&configuration.registry)
        .context("failed to resolve story paths")?;

    match cli.command {
        Command::Plan => {
            print!("{batches}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { dry_run } => run(configuration, &batches, dry_run).await,
    }
}

async fn run(configuration: Configuration, batches: &ResolvedBatches, dry_run: bool) -> Result<ExitCode> {
    let Configuration {
        settings,
        registry,
        base_dir,
    } = configuration;
    let dry_run = dry_run || settings.dry_run;

    let context = Arc::new(RunContext::new());
    let statistics = RunStatistics::new();
    let variables = Arc::new(ScopedVariables::new());
    let chain = ReporterChain::new()
        .with(Arc::new(LoggingReporter))
        .with(Arc::new(statistics.clone()))
        .with(Arc::new(VariableScopeReporter::new(variables.clone())));
    let reporter: Arc<dyn StoryReporter> =
        Arc::new(RunContextReporter::new(context.clone()).with_next(Arc::new(chain)));
    let runtime = build_runtime(&settings, &base_dir, dry_run, reporter, context.clone())?;

    let report_dir = resolve(&base_dir, &settings.report_dir);
    let run_id = generate_run_id();
    let view = JsonViewGenerator::new(&report_dir, statistics.clone()).with_run_id(&run_id);

    let mut scheduler = BatchScheduler::new(registry, settings, runtime, context)
        .with_variables(variables)
        .with_report_generator(Arc::new(view));
    match EventWriter::try_new(&report_dir, run_id.as_str()) {
        Ok(events) => scheduler = scheduler.with_event_writer(events),
        Err(err) => warn!(dir = %report_dir.display(), error = %err, "event log disabled"),
    }

    let summary = scheduler.run_batches(batches).await?;
    statistics.log_summary();
    print_summary(&summary);
    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn build_runtime(
    settings: &RunnerSettings,
    base_dir: &Path,
    dry_run: bool,
    reporter: Arc<dyn StoryReporter>,
    context: Arc<RunContext>,
) -> Result<Arc<dyn ExecutionRuntime>> {
    if dry_run {
        return Ok(Arc::new(StoryManager::new(DryRunStoryRunner::new(), reporter, context)));
    }
    let Some(command) = settings.story_command.as_deref() else {
        bail!("no 'story-command' configured in [runner]; use --dry-run to walk stories only");
    };
    let runner = ProcessStoryRunner::new(command)?.with_working_dir(base_dir);
    Ok(Arc::new(StoryManager::new(runner, reporter, context)))
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.batches {
        println!(
            "{}: {} ({} stories)",
            outcome.batch, outcome.status, outcome.stories
        );
        for (story, error) in &outcome.failures {
            println!("  FAILED {story}: {error}");
        }
    }
    if summary.stopped_early {
        println!("run stopped after a failed batch");
    }
    let status = summary.status();
    println!(
        "{}",
        match status {
            BatchStatus::Failed => format!("FAILED: {} failed stories", summary.failure_count()),
            _ => "PASSED".to_string(),
        }
    );
}
