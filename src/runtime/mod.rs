//! Story execution runtime.
//!
//! The scheduler drives batches through [`ExecutionRuntime`]. The provided
//! implementation, [`StoryManager`], dispatches each story onto the batch's
//! worker pool, enforces the per-story timeout and runs the suite hooks
//! allowed by the batch lifecycle. What executing a story means is left to a
//! [`StoryRunner`]: [`ProcessStoryRunner`] runs a shell command per story,
//! [`DryRunStoryRunner`] walks the story text without executing anything.

mod dry_run;
mod manager;
mod outline;
mod process;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BatchKey;
use crate::context::WorkerId;
use crate::lifecycle::{BatchLifecycle, Stage};
use crate::meta::{Meta, MetaFilter};
use crate::parallel::{BatchFailures, PoolError, WorkerPool};
use crate::paths::StoryId;
use crate::reporter::StoryReporter;

pub use dry_run::DryRunStoryRunner;
pub use manager::StoryManager;
pub use outline::{ScenarioOutline, StoryOutline};
pub use process::{ProcessStoryRunner, BATCH_ENV, META_FILTER_ENV, STORY_ENV, WORKER_ENV};

/// Failure of a single story. Recorded in [`BatchFailures`], never
/// propagated past the batch.
#[derive(Error, Debug)]
pub enum StoryError {
    #[error("story failed: {0}")]
    Failed(String),

    #[error("story timed out after {0:?}")]
    TimedOut(Duration),

    #[error("story I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Setup failure of the runtime. Aborts the run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("story command is empty")]
    EmptyCommand,

    #[error("lifecycle for {0} was not rebuilt before running its stories")]
    LifecycleNotBuilt(BatchKey),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Result type for runtime setup.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Everything the runtime needs to execute one batch.
pub struct BatchRequest<'a> {
    pub batch: BatchKey,
    pub stories: &'a [StoryId],
    pub meta_filter: &'a MetaFilter,
    pub failures: &'a BatchFailures,
    pub story_timeout: Duration,
    pub pool: &'a WorkerPool,
}

/// Executes the stories of a batch.
#[async_trait]
pub trait ExecutionRuntime: Send + Sync {
    /// Installs the lifecycle flags for the next batch. Must be called
    /// before every [`run_stories`](Self::run_stories).
    fn rebuild_lifecycle(&self, lifecycle: BatchLifecycle);

    /// Runs the stories and returns once all of them finished. Story
    /// failures go to `request.failures`.
    async fn run_stories(&self, request: BatchRequest<'_>) -> RuntimeResult<()>;

    /// Drops batch-scoped state so the next batch starts clean.
    fn reset(&self);
}

/// A story as handed to a [`StoryRunner`].
pub struct StoryRun<'a> {
    pub story: &'a StoryId,
    pub worker: WorkerId,
    pub meta_filter: &'a MetaFilter,
    pub reporter: &'a dyn StoryReporter,
}

/// Executes a single story.
#[async_trait]
pub trait StoryRunner: Send + Sync + 'static {
    /// Story-level tags, consulted against the batch meta filter.
    async fn story_meta(&self, _story: &StoryId) -> Result<Meta, StoryError> {
        Ok(Meta::new())
    }

    /// Runs the story, reporting scenarios and steps. Returns an error when
    /// the story failed.
    async fn run_story(&self, run: StoryRun<'_>) -> Result<(), StoryError>;

    /// Runs suite-wide hooks for `stage`.
    async fn run_suite_hooks(
        &self,
        _stage: Stage,
        _worker: WorkerId,
        _reporter: &dyn StoryReporter,
    ) -> Result<(), StoryError> {
        Ok(())
    }

    /// True when the runner walks stories without executing them.
    fn is_dry_run(&self) -> bool {
        false
    }
}
