use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{BatchRequest, ExecutionRuntime, RuntimeError, RuntimeResult, StoryError, StoryRun, StoryRunner};
use crate::config::BatchKey;
use crate::context::{RunContext, WorkerId};
use crate::lifecycle::{BatchLifecycle, Stage};
use crate::meta::MetaFilter;
use crate::parallel::BatchFailures;
use crate::paths::StoryId;
use crate::reporter::StoryReporter;

/// Slot number used for suite hooks, which run outside the worker pool.
const SUITE_WORKER_INDEX: usize = 0;

/// Default [`ExecutionRuntime`]: runs each story on the batch's worker pool
/// through a [`StoryRunner`].
pub struct StoryManager<R: StoryRunner> {
    runner: Arc<R>,
    reporter: Arc<dyn StoryReporter>,
    context: Arc<RunContext>,
    lifecycle: Mutex<Option<BatchLifecycle>>,
    dry_run_announced: AtomicBool,
}

impl<R: StoryRunner> StoryManager<R> {
    /// `reporter` receives every callback; it is normally a
    /// [`RunContextReporter`](crate::reporter::RunContextReporter) over
    /// `context`.
    pub fn new(runner: R, reporter: Arc<dyn StoryReporter>, context: Arc<RunContext>) -> Self {
        Self {
            runner: Arc::new(runner),
            reporter,
            context,
            lifecycle: Mutex::new(None),
            dry_run_announced: AtomicBool::new(false),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Lifecycle installed for the current batch, if any.
    pub fn lifecycle(&self) -> Option<BatchLifecycle> {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_stage(&self, batch: BatchKey, stage: Stage, failures: &BatchFailures) {
        let worker = WorkerId::new(batch, SUITE_WORKER_INDEX);
        info!(batch = %batch, stage = %stage, "running suite hooks");
        self.reporter.before_stories_stage(stage);
        if let Err(err) = self
            .runner
            .run_suite_hooks(stage, worker, self.reporter.as_ref())
            .await
        {
            warn!(batch = %batch, stage = %stage, error = %err, "suite hooks failed");
            failures.add(StoryId::for_stage(stage), err);
        }
        self.reporter.after_stories_stage(stage);
    }
}

#[async_trait]
impl<R: StoryRunner> ExecutionRuntime for StoryManager<R> {
    fn rebuild_lifecycle(&self, lifecycle: BatchLifecycle) {
        debug!(?lifecycle, "rebuilding batch lifecycle");
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(lifecycle);
    }

    async fn run_stories(&self, request: BatchRequest<'_>) -> RuntimeResult<()> {
        let lifecycle = self
            .lifecycle()
            .ok_or(RuntimeError::LifecycleNotBuilt(request.batch))?;

        if self.runner.is_dry_run() && !self.dry_run_announced.swap(true, Ordering::SeqCst) {
            self.reporter.dry_run();
        }

        if lifecycle.report_before {
            self.run_stage(request.batch, Stage::Before, request.failures)
                .await;
        }

        let filter = Arc::new(request.meta_filter.clone());
        for story in request.stories {
            let task = StoryTask {
                runner: self.runner.clone(),
                reporter: self.reporter.clone(),
                context: self.context.clone(),
                failures: request.failures.clone(),
                filter: filter.clone(),
                story: story.clone(),
                timeout: request.story_timeout,
            };
            let worker = request.pool.submit(move |worker| task.run(worker)).await?;
            debug!(worker = %worker, story = %story, "story submitted");
        }
        request.pool.join().await;

        if lifecycle.should_run_after(request.failures.len()) {
            self.run_stage(request.batch, Stage::After, request.failures)
                .await;
        }
        Ok(())
    }

    fn reset(&self) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One story, owned by the worker task that runs it.
struct StoryTask<R: StoryRunner> {
    runner: Arc<R>,
    reporter: Arc<dyn StoryReporter>,
    context: Arc<RunContext>,
    failures: BatchFailures,
    filter: Arc<MetaFilter>,
    story: StoryId,
    timeout: Duration,
}

impl<R: StoryRunner> StoryTask<R> {
    async fn run(self, worker: WorkerId) {
        let _panic_guard = PanicGuard {
            task: &self,
            worker,
        };
        let reporter = self.reporter.as_ref();

        let meta = match self.runner.story_meta(&self.story).await {
            Ok(meta) => meta,
            Err(err) => {
                warn!(worker = %worker, story = %self.story, error = %err, "failed to read story");
                self.failures.add(self.story.clone(), err);
                return;
            }
        };
        if !self.filter.allows(&meta) {
            reporter.story_excluded(&worker, &self.story, &self.filter);
            reporter.before_story(&worker, &self.story, false);
            reporter.after_story(&worker, false);
            return;
        }

        reporter.before_story(&worker, &self.story, false);
        let started = Instant::now();
        let run = StoryRun {
            story: &self.story,
            worker,
            meta_filter: &self.filter,
            reporter,
        };
        let mut timed_out = false;
        let outcome = match tokio::time::timeout(self.timeout, self.runner.run_story(run)).await {
            Ok(result) => result,
            Err(_) => {
                timed_out = true;
                let step = self
                    .context
                    .running_step(&worker)
                    .unwrap_or_else(|| self.story.file_name().to_string());
                reporter.failed(&worker, &step, "story execution timed out");
                Err(StoryError::TimedOut(self.timeout))
            }
        };

        // Given stories interrupted by a timeout are still on the stack.
        while self.context.story_depth(&worker) > 1 {
            reporter.after_story(&worker, true);
        }
        let failed_step = self
            .context
            .running_story(&worker)
            .is_some_and(|story| story.failed);
        if let (Err(err), false, false) = (&outcome, failed_step, timed_out) {
            reporter.failed(&worker, self.story.file_name(), &err.to_string());
        }
        reporter.after_story(&worker, false);

        let outcome = match outcome {
            Ok(()) if failed_step => Err(StoryError::Failed("a step failed".to_string())),
            other => other,
        };
        match outcome {
            Ok(()) => debug!(
                worker = %worker,
                story = %self.story,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "story passed"
            ),
            Err(err) => {
                warn!(worker = %worker, story = %self.story, error = %err, "story failed");
                self.failures.add(self.story.clone(), err);
            }
        }
    }
}

/// Records a failure for the story if its task unwinds, and clears the
/// worker's story stack so the slot can be reused.
struct PanicGuard<'a, R: StoryRunner> {
    task: &'a StoryTask<R>,
    worker: WorkerId,
}

impl<R: StoryRunner> Drop for PanicGuard<'_, R> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        while self.task.context.remove_running_story(&self.worker).is_some() {}
        self.task.failures.add(
            self.task.story.clone(),
            StoryError::Failed("story runner panicked".to_string()),
        );
    }
}
