use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::paths::StoryId;
use crate::runtime::StoryError;

/// Story failures recorded during one batch.
///
/// Cloned handles share the same collection, so workers append
/// concurrently without losing entries.
#[derive(Debug, Clone, Default)]
pub struct BatchFailures {
    inner: Arc<Mutex<Vec<(StoryId, StoryError)>>>,
}

impl BatchFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, story: StoryId, error: StoryError) {
        self.entries().push((story, error));
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Failed stories with their error messages, in recording order.
    pub fn summaries(&self) -> Vec<(StoryId, String)> {
        self.entries()
            .iter()
            .map(|(story, error)| (story.clone(), error.to_string()))
            .collect()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(StoryId, StoryError)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn story(name: &str) -> StoryId {
        StoryId::from_path(Path::new(&format!("/stories/{name}.story")))
    }

    #[test]
    fn test_add_and_summarize() {
        let failures = BatchFailures::new();
        assert!(failures.is_empty());

        failures.add(story("a"), StoryError::Failed("step failed".to_string()));
        failures.add(story("b"), StoryError::TimedOut(Duration::from_secs(5)));

        assert_eq!(failures.len(), 2);
        let summaries = failures.summaries();
        assert_eq!(summaries[0].0, story("a"));
        assert_eq!(summaries[0].1, "story failed: step failed");
        assert_eq!(summaries[1].1, "story timed out after 5s");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let failures = BatchFailures::new();
        let mut handles = Vec::new();
        for task in 0..16 {
            let failures = failures.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    failures.add(
                        story(&format!("{task}-{n}")),
                        StoryError::Failed(format!("{task}-{n}")),
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(failures.len(), 400);
    }
}
