use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;

use super::outline::StoryOutline;
use super::{StoryError, StoryRun, StoryRunner};
use crate::context::WorkerId;
use crate::meta::{Meta, MetaFilter};
use crate::paths::StoryId;
use crate::reporter::StoryReporter;

const MAX_GIVEN_STORY_DEPTH: usize = 16;

/// Given stories nest, so the walk recurses through a boxed future.
type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoryError>> + Send + 'a>>;

/// Walks story files through the reporters without executing any step.
///
/// Scenarios excluded by the meta filter are left out; every other step is
/// reported as not performed, once per examples row.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunStoryRunner;

impl DryRunStoryRunner {
    pub fn new() -> Self {
        Self
    }

    fn walk<'a>(
        &'a self,
        path: PathBuf,
        worker: &'a WorkerId,
        filter: &'a MetaFilter,
        reporter: &'a dyn StoryReporter,
        depth: usize,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let outline = StoryOutline::parse(&tokio::fs::read_to_string(&path).await?);
            let base = path.parent().unwrap_or(Path::new("/")).to_path_buf();

            for given in &outline.given_stories {
                if depth >= MAX_GIVEN_STORY_DEPTH {
                    return Err(StoryError::Failed(format!(
                        "given stories nested deeper than {MAX_GIVEN_STORY_DEPTH} levels at {}",
                        path.display()
                    )));
                }
                let given_path = base.join(given);
                reporter.before_story(worker, &StoryId::from_path(&given_path), true);
                let result = self
                    .walk(given_path, worker, filter, reporter, depth + 1)
                    .await;
                reporter.after_story(worker, true);
                result?;
            }

            for scenario in &outline.scenarios {
                let meta = scenario.meta.inherit_from(&outline.meta);
                if !filter.allows(&meta) {
                    continue;
                }
                reporter.before_scenario(worker, &scenario.title, &meta);
                if scenario.examples.is_empty() {
                    walk_steps(&scenario.steps, worker, reporter);
                }
                for (index, row) in scenario.examples.iter().enumerate() {
                    reporter.example(worker, Some(index), row);
                    walk_steps(&scenario.steps, worker, reporter);
                }
                reporter.after_scenario(worker);
            }
            Ok(())
        })
    }
}

fn walk_steps(steps: &[String], worker: &WorkerId, reporter: &dyn StoryReporter) {
    for step in steps {
        reporter.before_step(worker, step);
        reporter.not_performed(worker, step);
    }
}

#[async_trait]
impl StoryRunner for DryRunStoryRunner {
    async fn story_meta(&self, story: &StoryId) -> Result<Meta, StoryError> {
        let text = tokio::fs::read_to_string(story.as_path()).await?;
        Ok(StoryOutline::parse(&text).meta)
    }

    async fn run_story(&self, run: StoryRun<'_>) -> Result<(), StoryError> {
        self.walk(
            run.story.as_path().to_path_buf(),
            &run.worker,
            run.meta_filter,
            run.reporter,
            0,
        )
        .await
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
