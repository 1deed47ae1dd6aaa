//! Execution callbacks.
//!
//! The execution runtime reports progress through [`StoryReporter`]. Every
//! callback has a no-op default, so reporters implement only what they
//! observe. Story-level callbacks carry the [`WorkerId`] of the pool slot
//! running the story; suite-level callbacks do not.

mod logging;
mod run_context;

use std::sync::Arc;

use crate::context::{ExampleRow, WorkerId};
use crate::lifecycle::Stage;
use crate::meta::{Meta, MetaFilter};
use crate::paths::StoryId;

pub use logging::LoggingReporter;
pub use run_context::RunContextReporter;

/// Observer of story execution.
#[allow(unused_variables)]
pub trait StoryReporter: Send + Sync {
    /// Suite hooks of `stage` are about to run.
    fn before_stories_stage(&self, stage: Stage) {}

    fn after_stories_stage(&self, stage: Stage) {}

    /// The story was filtered out by the meta filter. Reported before the
    /// story is entered.
    fn story_excluded(&self, worker: &WorkerId, story: &StoryId, filter: &MetaFilter) {}

    fn before_story(&self, worker: &WorkerId, story: &StoryId, given: bool) {}

    fn after_story(&self, worker: &WorkerId, given: bool) {}

    fn before_scenario(&self, worker: &WorkerId, title: &str, meta: &Meta) {}

    fn after_scenario(&self, worker: &WorkerId) {}

    /// The scenario moved to an examples-table row; `None` when the
    /// scenario is not example-driven.
    fn example(&self, worker: &WorkerId, index: Option<usize>, row: &ExampleRow) {}

    fn before_step(&self, worker: &WorkerId, step: &str) {}

    fn successful(&self, worker: &WorkerId, step: &str) {}

    fn failed(&self, worker: &WorkerId, step: &str, cause: &str) {}

    /// Step walked but not executed, as in a dry run.
    fn not_performed(&self, worker: &WorkerId, step: &str) {}

    /// The run executes in dry-run mode.
    fn dry_run(&self) {}
}

/// Fans callbacks out to several reporters, in order.
#[derive(Clone, Default)]
pub struct ReporterChain {
    reporters: Vec<Arc<dyn StoryReporter>>,
}

impl ReporterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn StoryReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    fn each(&self, call: impl Fn(&dyn StoryReporter)) {
        for reporter in &self.reporters {
            call(reporter.as_ref());
        }
    }
}

impl StoryReporter for ReporterChain {
    fn before_stories_stage(&self, stage: Stage) {
        self.each(|r| r.before_stories_stage(stage));
    }

    fn after_stories_stage(&self, stage: Stage) {
        self.each(|r| r.after_stories_stage(stage));
    }

    fn story_excluded(&self, worker: &WorkerId, story: &StoryId, filter: &MetaFilter) {
        self.each(|r| r.story_excluded(worker, story, filter));
    }

    fn before_story(&self, worker: &WorkerId, story: &StoryId, given: bool) {
        self.each(|r| r.before_story(worker, story, given));
    }

    fn after_story(&self, worker: &WorkerId, given: bool) {
        self.each(|r| r.after_story(worker, given));
    }

    fn before_scenario(&self, worker: &WorkerId, title: &str, meta: &Meta) {
        self.each(|r| r.before_scenario(worker, title, meta));
    }

    fn after_scenario(&self, worker: &WorkerId) {
        self.each(|r| r.after_scenario(worker));
    }

    fn example(&self, worker: &WorkerId, index: Option<usize>, row: &ExampleRow) {
        self.each(|r| r.example(worker, index, row));
    }

    fn before_step(&self, worker: &WorkerId, step: &str) {
        self.each(|r| r.before_step(worker, step));
    }

    fn successful(&self, worker: &WorkerId, step: &str) {
        self.each(|r| r.successful(worker, step));
    }

    fn failed(&self, worker: &WorkerId, step: &str, cause: &str) {
        self.each(|r| r.failed(worker, step, cause));
    }

    fn not_performed(&self, worker: &WorkerId, step: &str) {
        self.each(|r| r.not_performed(worker, step));
    }

    fn dry_run(&self) {
        self.each(|r| r.dry_run());
    }
}
