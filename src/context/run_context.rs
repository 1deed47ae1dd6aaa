use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use super::running::{RunningScenario, RunningStory, StoryStatus};
use super::worker::WorkerId;
use crate::config::BatchKey;
use crate::paths::StoryId;

/// Live record of what is executing.
///
/// Story stacks are kept per worker, so stories running side by side never
/// see each other's scenario or step. Batch and completion state are shared.
#[derive(Debug, Default)]
pub struct RunContext {
    running_batch: RwLock<Option<BatchKey>>,
    stacks: Mutex<HashMap<WorkerId, Vec<RunningStory>>>,
    statuses: Mutex<HashMap<StoryId, StoryStatus>>,
    run_completed: AtomicBool,
    dry_run: AtomicBool,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_running_batch(&self, batch: BatchKey) {
        *self
            .running_batch
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(batch);
    }

    pub fn remove_running_batch(&self) {
        *self
            .running_batch
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn running_batch(&self) -> Option<BatchKey> {
        *self
            .running_batch
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes a story onto the worker's stack, applying a recorded exclusion.
    pub fn put_running_story(&self, worker: &WorkerId, mut story: RunningStory) {
        if self.story_status(&story.id) == Some(StoryStatus::Excluded) {
            story.excluded = true;
        }
        debug!(worker = %worker, story = %story.id, given = story.given, "story entered");
        self.stacks().entry(*worker).or_default().push(story);
    }

    /// Pops the worker's current story; the parent story becomes current.
    pub fn remove_running_story(&self, worker: &WorkerId) -> Option<RunningStory> {
        let mut stacks = self.stacks();
        let stack = stacks.get_mut(worker)?;
        let story = stack.pop();
        if stack.is_empty() {
            stacks.remove(worker);
        }
        if let Some(story) = &story {
            debug!(worker = %worker, story = %story.id, "story exited");
        }
        story
    }

    /// Snapshot of the worker's current story.
    pub fn running_story(&self, worker: &WorkerId) -> Option<RunningStory> {
        self.stacks()
            .get(worker)
            .and_then(|stack| stack.last())
            .cloned()
    }

    pub fn running_scenario(&self, worker: &WorkerId) -> Option<RunningScenario> {
        self.running_story(worker).and_then(|story| story.scenario)
    }

    pub fn running_step(&self, worker: &WorkerId) -> Option<String> {
        self.running_story(worker).and_then(|story| story.step)
    }

    /// Depth of the worker's story stack; nested given stories add levels.
    pub fn story_depth(&self, worker: &WorkerId) -> usize {
        self.stacks().get(worker).map_or(0, Vec::len)
    }

    /// Workers that currently have a story in flight.
    pub fn active_workers(&self) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = self.stacks().keys().copied().collect();
        workers.sort();
        workers
    }

    /// Applies `update` to the worker's current story. Returns `None` when
    /// the worker has no story.
    pub fn with_running_story<R>(
        &self,
        worker: &WorkerId,
        update: impl FnOnce(&mut RunningStory) -> R,
    ) -> Option<R> {
        self.stacks()
            .get_mut(worker)
            .and_then(|stack| stack.last_mut())
            .map(update)
    }

    pub fn set_story_status(&self, story: &StoryId, status: StoryStatus) {
        self.statuses().insert(story.clone(), status);
    }

    pub fn story_status(&self, story: &StoryId) -> Option<StoryStatus> {
        self.statuses().get(story).copied()
    }

    /// Forgets the statuses recorded so far. A story listed again in a
    /// later batch is judged by that batch's filter alone.
    pub fn clear_story_statuses(&self) {
        self.statuses().clear();
    }

    /// Marks the start of the final suite teardown. Subsequent step tracking
    /// is ignored.
    pub fn complete_run(&self) {
        self.run_completed.store(true, Ordering::SeqCst);
    }

    pub fn is_run_completed(&self) -> bool {
        self.run_completed.load(Ordering::SeqCst)
    }

    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::SeqCst)
    }

    fn stacks(&self) -> MutexGuard<'_, HashMap<WorkerId, Vec<RunningStory>>> {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn statuses(&self) -> MutexGuard<'_, HashMap<StoryId, StoryStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Meta;
    use std::path::Path;
    use std::sync::Arc;

    fn worker(index: usize) -> WorkerId {
        WorkerId::new(BatchKey::new(1).expect("key"), index)
    }

    fn story(name: &str) -> StoryId {
        StoryId::from_path(Path::new(&format!("/stories/{name}.story")))
    }

    #[test]
    fn test_running_batch() {
        let context = RunContext::new();
        assert_eq!(context.running_batch(), None);
        let key = BatchKey::new(2).expect("key");
        context.put_running_batch(key);
        assert_eq!(context.running_batch(), Some(key));
        context.remove_running_batch();
        assert_eq!(context.running_batch(), None);
    }

    #[test]
    fn test_nested_story_restores_parent_state() {
        let context = RunContext::new();
        let w = worker(1);

        context.put_running_story(&w, RunningStory::new(story("a"), false));
        context.with_running_story(&w, |s| {
            s.scenario = Some(RunningScenario::new("Parent scenario", Meta::new()));
            s.step = Some("When I open the page".to_string());
        });

        context.put_running_story(&w, RunningStory::new(story("b"), true));
        assert_eq!(context.story_depth(&w), 2);
        assert_eq!(context.running_story(&w).expect("current").id, story("b"));
        assert_eq!(context.running_step(&w), None);

        let popped = context.remove_running_story(&w).expect("popped");
        assert!(popped.given);

        let current = context.running_story(&w).expect("parent");
        assert_eq!(current.id, story("a"));
        assert_eq!(current.step.as_deref(), Some("When I open the page"));
        assert_eq!(
            context.running_scenario(&w).expect("scenario").title(),
            "Parent scenario"
        );
    }

    #[test]
    fn test_workers_are_isolated() {
        let context = RunContext::new();
        context.put_running_story(&worker(1), RunningStory::new(story("a"), false));
        context.put_running_story(&worker(2), RunningStory::new(story("b"), false));
        context.with_running_story(&worker(1), |s| s.step = Some("step a".to_string()));

        assert_eq!(context.running_step(&worker(1)).as_deref(), Some("step a"));
        assert_eq!(context.running_step(&worker(2)), None);
        assert_eq!(context.active_workers(), vec![worker(1), worker(2)]);

        context.remove_running_story(&worker(1));
        assert_eq!(context.active_workers(), vec![worker(2)]);
        assert!(context.remove_running_story(&worker(1)).is_none());
    }

    #[test]
    fn test_recorded_status_applies_at_entry() {
        let context = RunContext::new();
        let w = worker(1);
        context.set_story_status(&story("a"), StoryStatus::Excluded);
        context.put_running_story(&w, RunningStory::new(story("a"), false));
        let current = context.running_story(&w).expect("story");
        assert!(current.excluded);
        assert!(!current.failed);
    }

    #[test]
    fn test_failure_is_not_carried_into_next_entry() {
        let context = RunContext::new();
        let w = worker(1);
        context.put_running_story(&w, RunningStory::new(story("a"), false));
        context.with_running_story(&w, |s| s.failed = true);
        context.remove_running_story(&w);
        assert_eq!(context.story_status(&story("a")), None);

        context.put_running_story(&w, RunningStory::new(story("a"), false));
        assert!(!context.running_story(&w).expect("story").failed);
    }

    #[test]
    fn test_clear_story_statuses() {
        let context = RunContext::new();
        context.set_story_status(&story("a"), StoryStatus::Excluded);
        context.clear_story_statuses();
        assert_eq!(context.story_status(&story("a")), None);

        let w = worker(1);
        context.put_running_story(&w, RunningStory::new(story("a"), false));
        assert!(!context.running_story(&w).expect("story").excluded);
    }

    #[test]
    fn test_flags() {
        let context = RunContext::new();
        assert!(!context.is_run_completed());
        assert!(!context.is_dry_run());
        context.complete_run();
        context.set_dry_run(true);
        assert!(context.is_run_completed());
        assert!(context.is_dry_run());
    }

    #[test]
    fn test_concurrent_workers_do_not_lose_updates() {
        let context = Arc::new(RunContext::new());
        std::thread::scope(|scope| {
            for index in 1..=8 {
                let context = Arc::clone(&context);
                scope.spawn(move || {
                    let w = worker(index);
                    for round in 0..50 {
                        context.put_running_story(
                            &w,
                            RunningStory::new(story(&format!("s{index}-{round}")), false),
                        );
                        context.with_running_story(&w, |s| s.step = Some(format!("{round}")));
                        assert_eq!(context.running_step(&w), Some(format!("{round}")));
                        context.remove_running_story(&w);
                    }
                });
            }
        });
        assert!(context.active_workers().is_empty());
    }
}
