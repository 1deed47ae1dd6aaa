//! Library-level runs through the real story manager and worker pools.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use storybatch::config::{BatchConfig, BatchKey, BatchRegistry, RunnerSettings};
use storybatch::context::{RunContext, WorkerId};
use storybatch::lifecycle::Stage;
use storybatch::paths::{ResolvedBatches, StoryId};
use storybatch::report::{ReportGenerator, ReportResult, RunStatistics};
use storybatch::reporter::{ReporterChain, RunContextReporter, StoryReporter};
use storybatch::runtime::{StoryError, StoryManager, StoryRun, StoryRunner};
use storybatch::scheduler::{BatchScheduler, BatchStatus};
use storybatch::variables::{ScopedVariables, VariableScope};

/// Runner failing the stories whose file name is listed.
#[derive(Default)]
struct ScriptedRunner {
    failing: Vec<&'static str>,
    /// Fail on the first run only.
    failing_once: Mutex<Vec<&'static str>>,
    attempted: Mutex<Vec<String>>,
    hooks: Mutex<Vec<Stage>>,
}

#[async_trait]
impl StoryRunner for ScriptedRunner {
    async fn run_story(&self, run: StoryRun<'_>) -> Result<(), StoryError> {
        let name = run.story.file_name().to_string();
        self.attempted.lock().expect("attempted").push(name.clone());
        run.reporter.before_scenario(&run.worker, "Scenario", &Default::default());
        run.reporter.before_step(&run.worker, "When the story runs");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let fails_now = self.failing.contains(&name.as_str()) || {
            let mut once = self.failing_once.lock().expect("failing_once");
            match once.iter().position(|n| *n == name) {
                Some(index) => {
                    once.remove(index);
                    true
                }
                None => false,
            }
        };
        if fails_now {
            run.reporter
                .failed(&run.worker, "When the story runs", "assertion failed");
            run.reporter.after_scenario(&run.worker);
            return Err(StoryError::Failed("assertion failed".to_string()));
        }
        run.reporter.successful(&run.worker, "When the story runs");
        run.reporter.after_scenario(&run.worker);
        Ok(())
    }

    async fn run_suite_hooks(
        &self,
        stage: Stage,
        _worker: WorkerId,
        _reporter: &dyn StoryReporter,
    ) -> Result<(), StoryError> {
        self.hooks.lock().expect("hooks").push(stage);
        Ok(())
    }
}

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

impl ReportGenerator for CountingGenerator {
    fn generate_view(&self) -> ReportResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn key(n: u32) -> BatchKey {
    BatchKey::new(n).expect("key")
}

fn batch(n: u32, threads: usize, settings: &RunnerSettings) -> BatchConfig {
    let mut config = BatchConfig::with_defaults(key(n), settings);
    config.resource_location = "/stories".to_string();
    config.threads = Some(threads);
    config
}

fn stories(n: u32, names: &[&str]) -> (BatchKey, Vec<StoryId>) {
    let ids = names
        .iter()
        .map(|name| StoryId::from_path(Path::new(&format!("/stories/batch{n}/{name}"))))
        .collect();
    (key(n), ids)
}

struct Harness {
    scheduler: BatchScheduler,
    manager: Arc<StoryManager<ScriptedRunner>>,
    statistics: RunStatistics,
    generator: Arc<CountingGenerator>,
    context: Arc<RunContext>,
}

fn harness(runner: ScriptedRunner, settings: RunnerSettings, configs: Vec<BatchConfig>) -> Harness {
    let context = Arc::new(RunContext::new());
    let statistics = RunStatistics::new();
    let reporter = RunContextReporter::new(context.clone())
        .with_next(Arc::new(ReporterChain::new().with(Arc::new(statistics.clone()))));
    let manager = Arc::new(StoryManager::new(runner, Arc::new(reporter), context.clone()));
    let generator = Arc::new(CountingGenerator::default());
    let scheduler = BatchScheduler::new(
        BatchRegistry::from_configs(configs),
        settings,
        manager.clone(),
        context.clone(),
    )
    .with_report_generator(generator.clone());
    Harness {
        scheduler,
        manager,
        statistics,
        generator,
        context,
    }
}

#[tokio::test]
async fn test_first_batch_failure_stops_run_and_fires_after_hooks_once() {
    let settings = RunnerSettings::default().with_generate_view_after_batches(true);
    let configs = vec![batch(1, 1, &settings), batch(2, 3, &settings)];
    let h = harness(
        ScriptedRunner {
            failing: vec!["second.story"],
            ..Default::default()
        },
        settings,
        configs,
    );
    let plan = ResolvedBatches::from_batches([
        stories(1, &["first.story", "second.story"]),
        stories(2, &["x.story", "y.story", "z.story"]),
    ]);

    let summary = h.scheduler.run_batches(&plan).await.expect("run");

    let runner = h.manager.runner();
    assert_eq!(
        *runner.attempted.lock().expect("attempted"),
        vec!["first.story", "second.story"]
    );
    assert_eq!(
        *runner.hooks.lock().expect("hooks"),
        vec![Stage::Before, Stage::After]
    );
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    assert!(summary.stopped_early);
    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.batches[0].status, BatchStatus::Failed);
    assert_eq!(summary.batches[0].failures[0].0.file_name(), "second.story");
    assert!(h.context.is_run_completed());
    assert_eq!(h.context.running_batch(), None);

    let totals = h.statistics.snapshot();
    assert_eq!(totals.stories.passed, 1);
    assert_eq!(totals.stories.failed, 1);
}

#[tokio::test]
async fn test_ignored_failures_run_every_batch_in_parallel() {
    let settings = RunnerSettings::default().with_ignore_failure_in_batches(true);
    let configs = vec![batch(1, 1, &settings), batch(2, 3, &settings)];
    let h = harness(
        ScriptedRunner {
            failing: vec!["second.story"],
            ..Default::default()
        },
        settings,
        configs,
    );
    let plan = ResolvedBatches::from_batches([
        stories(1, &["first.story", "second.story"]),
        stories(2, &["x.story", "y.story", "z.story"]),
    ]);

    let summary = h.scheduler.run_batches(&plan).await.expect("run");

    let runner = h.manager.runner();
    let mut attempted = runner.attempted.lock().expect("attempted").clone();
    attempted.sort();
    assert_eq!(
        attempted,
        vec!["first.story", "second.story", "x.story", "y.story", "z.story"]
    );
    assert_eq!(
        *runner.hooks.lock().expect("hooks"),
        vec![Stage::Before, Stage::After]
    );
    assert!(!summary.stopped_early);
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(
        summary.outcome(&key(2)).map(|outcome| outcome.status),
        Some(BatchStatus::Passed)
    );
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.statistics.snapshot().batches["batch-2"].passed, 3);
}

#[tokio::test]
async fn test_story_timeout_fails_batch() {
    let settings = RunnerSettings::default();
    let mut config = batch(1, 2, &settings);
    config.story_execution_timeout = Duration::from_millis(1);

    let h = harness(ScriptedRunner::default(), settings, vec![config]);
    let plan = ResolvedBatches::from_batches([stories(1, &["slow.story"])]);

    let summary = h.scheduler.run_batches(&plan).await.expect("run");

    assert_eq!(summary.failure_count(), 1);
    assert_eq!(
        summary.batches[0].failures[0].1,
        "story timed out after 1ms"
    );
    assert!(h.context.active_workers().is_empty());
}

#[tokio::test]
async fn test_failure_does_not_follow_story_into_later_batch() {
    let settings = RunnerSettings::default().with_ignore_failure_in_batches(true);
    let configs = vec![batch(1, 1, &settings), batch(2, 1, &settings)];
    let h = harness(
        ScriptedRunner {
            failing_once: Mutex::new(vec!["shared.story"]),
            ..Default::default()
        },
        settings,
        configs,
    );
    let shared = StoryId::from_path(Path::new("/stories/shared.story"));
    let plan = ResolvedBatches::from_batches([
        (key(1), vec![shared.clone()]),
        (key(2), vec![shared]),
    ]);

    let summary = h.scheduler.run_batches(&plan).await.expect("run");

    assert_eq!(
        summary.outcome(&key(1)).map(|outcome| outcome.status),
        Some(BatchStatus::Failed)
    );
    assert_eq!(
        summary.outcome(&key(2)).map(|outcome| outcome.status),
        Some(BatchStatus::Passed)
    );
    assert_eq!(summary.failure_count(), 1);
    let totals = h.statistics.snapshot();
    assert_eq!(totals.stories.failed, 1);
    assert_eq!(totals.stories.passed, 1);
}

/// Runner reading `token` and handing the next batches its own batch name.
struct VariableRunner {
    variables: Arc<ScopedVariables>,
    seen: Mutex<Vec<Option<Value>>>,
}

#[async_trait]
impl StoryRunner for VariableRunner {
    async fn run_story(&self, run: StoryRun<'_>) -> Result<(), StoryError> {
        let token = self.variables.get(&run.worker, "token");
        self.seen.lock().expect("seen").push(token);
        self.variables.put(
            &run.worker,
            VariableScope::NextBatches,
            "token",
            run.worker.batch.to_string(),
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_next_batches_variables_reach_later_batches() {
    let settings = RunnerSettings::default();
    let configs = vec![batch(1, 1, &settings), batch(2, 1, &settings)];
    let variables = Arc::new(ScopedVariables::new());
    let context = Arc::new(RunContext::new());
    let manager = Arc::new(StoryManager::new(
        VariableRunner {
            variables: variables.clone(),
            seen: Mutex::default(),
        },
        Arc::new(RunContextReporter::new(context.clone())),
        context.clone(),
    ));
    let scheduler = BatchScheduler::new(
        BatchRegistry::from_configs(configs),
        settings,
        manager.clone(),
        context,
    )
    .with_variables(variables.clone());
    let plan = ResolvedBatches::from_batches([
        stories(1, &["a.story"]),
        stories(2, &["b.story"]),
    ]);

    scheduler.run_batches(&plan).await.expect("run");

    assert_eq!(
        *manager.runner().seen.lock().expect("seen"),
        vec![None, Some(Value::from("batch-1"))]
    );
    assert_eq!(
        variables.scope(None, VariableScope::Batch).get("token"),
        Some(&Value::from("batch-2"))
    );
}
