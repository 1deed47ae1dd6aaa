use tracing::{debug, info, warn};

use super::StoryReporter;
use crate::context::{ExampleRow, WorkerId};
use crate::lifecycle::Stage;
use crate::meta::{Meta, MetaFilter};
use crate::paths::StoryId;

/// Forwards execution callbacks to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

impl StoryReporter for LoggingReporter {
    fn before_stories_stage(&self, stage: Stage) {
        info!(stage = %stage, "running suite hooks");
    }

    fn story_excluded(&self, worker: &WorkerId, story: &StoryId, filter: &MetaFilter) {
        info!(worker = %worker, story = %story, filter = %filter, "story excluded by meta filter");
    }

    fn before_story(&self, worker: &WorkerId, story: &StoryId, given: bool) {
        if given {
            debug!(worker = %worker, story = %story, "running given story");
        } else {
            info!(worker = %worker, story = %story, "running story");
        }
    }

    fn after_story(&self, worker: &WorkerId, given: bool) {
        debug!(worker = %worker, given, "story finished");
    }

    fn before_scenario(&self, worker: &WorkerId, title: &str, _meta: &Meta) {
        debug!(worker = %worker, scenario = title, "scenario started");
    }

    fn example(&self, worker: &WorkerId, index: Option<usize>, _row: &ExampleRow) {
        if let Some(index) = index {
            debug!(worker = %worker, row = index + 1, "example row");
        }
    }

    fn before_step(&self, worker: &WorkerId, step: &str) {
        debug!(worker = %worker, step, "step started");
    }

    fn failed(&self, worker: &WorkerId, step: &str, cause: &str) {
        warn!(worker = %worker, step, cause, "step failed");
    }

    fn not_performed(&self, worker: &WorkerId, step: &str) {
        debug!(worker = %worker, step, "step not performed");
    }

    fn dry_run(&self) {
        info!("dry run: stories are walked without executing steps");
    }
}
