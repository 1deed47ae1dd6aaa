//! Sequential batch execution.
//!
//! [`BatchScheduler`] walks the resolved batches in ascending key order.
//! Each batch gets its own worker pool, lifecycle flags and failure
//! collection; batch-scoped state is torn down after every batch whatever
//! its outcome. A batch that ends with failures stops the run unless
//! failures are ignored for it. The report view, when enabled, is generated
//! exactly once after the loop, also when the loop ended with an error.

mod summary;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BatchKey, BatchRegistry, ConfigError, ExecutionParameters, RunnerSettings};
use crate::context::RunContext;
use crate::lifecycle::{BatchPosition, LifecycleGate};
use crate::meta::MetaFilter;
use crate::parallel::{BatchFailures, WorkerPool};
use crate::paths::{ResolvedBatches, StoryId};
use crate::report::{EventWriter, ReportGenerator};
use crate::runtime::{BatchRequest, ExecutionRuntime, RuntimeError};
use crate::variables::{ScopedVariables, VariableScope, VariableStore};

pub use summary::{BatchOutcome, BatchStatus, RunSummary};

/// Errors that abort a run. Story failures never end up here.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for scheduling.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Runs batches one after another.
pub struct BatchScheduler {
    registry: BatchRegistry,
    settings: RunnerSettings,
    runtime: Arc<dyn ExecutionRuntime>,
    context: Arc<RunContext>,
    variables: Arc<dyn VariableStore>,
    events: Option<EventWriter>,
    report: Option<Arc<dyn ReportGenerator>>,
}

impl BatchScheduler {
    pub fn new(
        registry: BatchRegistry,
        settings: RunnerSettings,
        runtime: Arc<dyn ExecutionRuntime>,
        context: Arc<RunContext>,
    ) -> Self {
        Self {
            registry,
            settings,
            runtime,
            context,
            variables: Arc::new(ScopedVariables::new()),
            events: None,
            report: None,
        }
    }

    pub fn with_variables(mut self, variables: Arc<dyn VariableStore>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_event_writer(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Generator invoked after the last batch when
    /// `generate-view-after-batches` is set.
    pub fn with_report_generator(mut self, report: Arc<dyn ReportGenerator>) -> Self {
        self.report = Some(report);
        self
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    /// Runs every batch of `batches` in order.
    ///
    /// Fails only on setup errors; story failures are reported in the
    /// returned [`RunSummary`].
    pub async fn run_batches(&self, batches: &ResolvedBatches) -> SchedulerResult<RunSummary> {
        info!("execution plan:\n{}", batches.to_string().trim_end());
        if let Some(events) = &self.events {
            events.emit_run_start(batches.len(), batches.story_count());
        }

        let result = self.run_loop(batches).await;

        if self.settings.generate_view_after_batches {
            self.generate_view();
        }
        if let Some(events) = &self.events {
            match &result {
                Ok(summary) => {
                    events.emit_run_complete(summary.status().to_string(), summary.failure_count())
                }
                Err(_) => events.emit_run_complete("error", 0),
            }
        }
        result
    }

    async fn run_loop(&self, batches: &ResolvedBatches) -> SchedulerResult<RunSummary> {
        let mut summary = RunSummary::default();
        for (index, (key, stories)) in batches.iter().enumerate() {
            let position = self.position(key, index, batches.len());
            let config = self.registry.batch_or_default(key, &self.settings);
            let parameters = config.execution_parameters(&self.settings);
            self.runtime
                .rebuild_lifecycle(LifecycleGate::lifecycle(position, parameters.ignore_failure));
            let filter = MetaFilter::from_filters(&parameters.meta_filters).map_err(|err| {
                ConfigError::InvalidValue {
                    batch: key.to_string(),
                    field: "meta-filters".to_string(),
                    message: err.to_string(),
                }
            })?;

            if parameters.skip {
                info!(batch = %key, name = %config.name, "skipping batch");
                if let Some(events) = &self.events {
                    events.emit_batch_skipped(*key);
                }
                summary.batches.push(BatchOutcome::skipped(*key, stories.len()));
                continue;
            }

            let outcome = self.run_batch(*key, stories, &parameters, &filter).await?;
            let stop = outcome.status == BatchStatus::Failed && !parameters.ignore_failure;
            summary.batches.push(outcome);
            if stop {
                summary.stopped_early = index + 1 < batches.len();
                warn!(batch = %key, "batch failed, remaining batches are not executed");
                break;
            }
        }
        Ok(summary)
    }

    async fn run_batch(
        &self,
        batch: BatchKey,
        stories: &[StoryId],
        parameters: &ExecutionParameters,
        filter: &MetaFilter,
    ) -> SchedulerResult<BatchOutcome> {
        info!(
            batch = %batch,
            stories = stories.len(),
            threads = parameters.threads,
            meta_filter = %filter,
            "running batch"
        );
        if let Some(events) = &self.events {
            events.emit_batch_start(batch, stories.len(), parameters.threads);
        }

        let started = Instant::now();
        let pool = WorkerPool::new(batch, parameters.threads);
        let failures = BatchFailures::new();
        self.context.put_running_batch(batch);

        let result = self
            .runtime
            .run_stories(BatchRequest {
                batch,
                stories,
                meta_filter: filter,
                failures: &failures,
                story_timeout: parameters.story_timeout,
                pool: &pool,
            })
            .await;

        self.variables.clear_variables(VariableScope::Batch);
        self.context.remove_running_batch();
        self.context.clear_story_statuses();
        pool.shutdown_now();
        self.runtime.reset();
        result?;

        let failures = failures.summaries();
        for (story, error) in &failures {
            warn!(batch = %batch, story = %story, error = %error, "story failed");
        }
        if let Some(events) = &self.events {
            events.emit_batch_complete(batch, failures.len());
        }
        let outcome = BatchOutcome::executed(batch, stories.len(), failures, started.elapsed());
        info!(
            batch = %batch,
            status = %outcome.status,
            failures = outcome.failures.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "batch finished"
        );
        Ok(outcome)
    }

    /// Position of `key` among all configured batches; batches missing from
    /// the registry fall back to their place in the plan.
    fn position(&self, key: &BatchKey, index: usize, planned: usize) -> BatchPosition {
        match self.registry.keys().position(|configured| configured == key) {
            Some(position) => BatchPosition::new(position, self.registry.len()),
            None => BatchPosition::new(index, planned),
        }
    }

    fn generate_view(&self) {
        match &self.report {
            Some(report) => {
                if let Err(err) = report.generate_view() {
                    warn!(error = %err, "failed to generate report view");
                }
            }
            None => warn!("report view requested but no generator is configured"),
        }
    }
}
