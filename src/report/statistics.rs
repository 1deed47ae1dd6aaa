use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::WorkerId;
use crate::meta::{Meta, MetaFilter};
use crate::paths::StoryId;
use crate::reporter::StoryReporter;

/// Outcome counters for one kind of item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passed: u64,
    pub failed: u64,
    pub excluded: u64,
    pub not_performed: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.excluded + self.not_performed
    }
}

/// Snapshot of the counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub stories: Tally,
    pub scenarios: Tally,
    pub steps: Tally,
    /// Top-level story counters per batch.
    pub batches: BTreeMap<String, Tally>,
}

#[derive(Debug, Default)]
struct Progress {
    story_failed: bool,
    story_excluded: bool,
    scenario_failed: bool,
}

#[derive(Debug, Default)]
struct StatisticsState {
    totals: Statistics,
    workers: HashMap<WorkerId, Progress>,
}

/// Reporter counting stories, scenarios and steps by outcome.
///
/// Given stories contribute their scenarios and steps but are not counted
/// as stories. Cloned handles share the same counters.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    inner: Arc<Mutex<StatisticsState>>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Statistics {
        self.state().totals.clone()
    }

    pub fn log_summary(&self) {
        let totals = self.snapshot();
        info!(
            stories_passed = totals.stories.passed,
            stories_failed = totals.stories.failed,
            stories_excluded = totals.stories.excluded,
            scenarios_passed = totals.scenarios.passed,
            scenarios_failed = totals.scenarios.failed,
            steps_passed = totals.steps.passed,
            steps_failed = totals.steps.failed,
            steps_not_performed = totals.steps.not_performed,
            "run statistics"
        );
    }

    fn state(&self) -> MutexGuard<'_, StatisticsState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoryReporter for RunStatistics {
    fn story_excluded(&self, worker: &WorkerId, _story: &StoryId, _filter: &MetaFilter) {
        self.state().workers.entry(*worker).or_default().story_excluded = true;
    }

    fn before_story(&self, worker: &WorkerId, _story: &StoryId, given: bool) {
        if !given {
            self.state().workers.entry(*worker).or_default().story_failed = false;
        }
    }

    fn after_story(&self, worker: &WorkerId, given: bool) {
        if given {
            return;
        }
        let mut state = self.state();
        let progress = state.workers.remove(worker).unwrap_or_default();
        let totals = &mut state.totals;
        count_story(&mut totals.stories, &progress);
        count_story(
            totals.batches.entry(worker.batch.to_string()).or_default(),
            &progress,
        );
    }

    fn before_scenario(&self, worker: &WorkerId, _title: &str, _meta: &Meta) {
        self.state().workers.entry(*worker).or_default().scenario_failed = false;
    }

    fn after_scenario(&self, worker: &WorkerId) {
        let mut state = self.state();
        let failed = state
            .workers
            .get(worker)
            .is_some_and(|progress| progress.scenario_failed);
        if failed {
            state.totals.scenarios.failed += 1;
        } else {
            state.totals.scenarios.passed += 1;
        }
    }

    fn successful(&self, _worker: &WorkerId, _step: &str) {
        self.state().totals.steps.passed += 1;
    }

    fn failed(&self, worker: &WorkerId, _step: &str, _cause: &str) {
        let mut state = self.state();
        state.totals.steps.failed += 1;
        let progress = state.workers.entry(*worker).or_default();
        progress.story_failed = true;
        progress.scenario_failed = true;
    }

    fn not_performed(&self, _worker: &WorkerId, _step: &str) {
        self.state().totals.steps.not_performed += 1;
    }
}

fn count_story(tally: &mut Tally, progress: &Progress) {
    if progress.story_excluded {
        tally.excluded += 1;
    } else if progress.story_failed {
        tally.failed += 1;
    } else {
        tally.passed += 1;
    }
}
