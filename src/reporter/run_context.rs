use std::sync::Arc;

use super::{ReporterChain, StoryReporter};
use crate::context::{ExampleRow, RunContext, RunningScenario, RunningStory, StoryStatus, WorkerId};
use crate::lifecycle::Stage;
use crate::meta::{Meta, MetaFilter};
use crate::paths::StoryId;

/// Keeps [`RunContext`] in step with execution callbacks, then forwards
/// each callback to the next reporter.
pub struct RunContextReporter {
    context: Arc<RunContext>,
    next: Arc<dyn StoryReporter>,
}

impl RunContextReporter {
    pub fn new(context: Arc<RunContext>) -> Self {
        Self {
            context,
            next: Arc::new(ReporterChain::default()),
        }
    }

    pub fn with_next(mut self, next: Arc<dyn StoryReporter>) -> Self {
        self.next = next;
        self
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }
}

impl StoryReporter for RunContextReporter {
    fn before_stories_stage(&self, stage: Stage) {
        if stage == Stage::After {
            self.context.complete_run();
        }
        self.next.before_stories_stage(stage);
    }

    fn after_stories_stage(&self, stage: Stage) {
        self.next.after_stories_stage(stage);
    }

    fn story_excluded(&self, worker: &WorkerId, story: &StoryId, filter: &MetaFilter) {
        self.context.set_story_status(story, StoryStatus::Excluded);
        self.next.story_excluded(worker, story, filter);
    }

    fn before_story(&self, worker: &WorkerId, story: &StoryId, given: bool) {
        self.context
            .put_running_story(worker, RunningStory::new(story.clone(), given));
        self.next.before_story(worker, story, given);
    }

    fn after_story(&self, worker: &WorkerId, given: bool) {
        self.next.after_story(worker, given);
        self.context.remove_running_story(worker);
    }

    fn before_scenario(&self, worker: &WorkerId, title: &str, meta: &Meta) {
        self.context.with_running_story(worker, |story| {
            story.scenario = Some(RunningScenario::new(title, meta.clone()));
        });
        self.next.before_scenario(worker, title, meta);
    }

    fn after_scenario(&self, worker: &WorkerId) {
        self.context.with_running_story(worker, |story| story.scenario = None);
        self.next.after_scenario(worker);
    }

    fn example(&self, worker: &WorkerId, index: Option<usize>, row: &ExampleRow) {
        self.context.with_running_story(worker, |story| {
            if let Some(scenario) = story.scenario.as_mut() {
                scenario.set_example(index, row.clone());
            }
        });
        self.next.example(worker, index, row);
    }

    fn before_step(&self, worker: &WorkerId, step: &str) {
        if !self.context.is_run_completed() {
            self.context
                .with_running_story(worker, |story| story.step = Some(step.to_string()));
        }
        self.next.before_step(worker, step);
    }

    fn successful(&self, worker: &WorkerId, step: &str) {
        if !self.context.is_run_completed() {
            self.context.with_running_story(worker, |story| story.step = None);
        }
        self.next.successful(worker, step);
    }

    fn failed(&self, worker: &WorkerId, step: &str, cause: &str) {
        if !self.context.is_run_completed() {
            self.context.with_running_story(worker, |story| {
                story.step = None;
                story.failed = true;
            });
        }
        self.next.failed(worker, step, cause);
    }

    fn not_performed(&self, worker: &WorkerId, step: &str) {
        if !self.context.is_run_completed() {
            self.context.with_running_story(worker, |story| story.step = None);
        }
        self.next.not_performed(worker, step);
    }

    fn dry_run(&self) {
        self.context.set_dry_run(true);
        self.next.dry_run();
    }
}
