use std::fmt;
use std::time::Duration;

use crate::config::BatchKey;
use crate::paths::StoryId;

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Passed => f.write_str("passed"),
            BatchStatus::Failed => f.write_str("failed"),
            BatchStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Result of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch: BatchKey,
    pub status: BatchStatus,
    /// Stories handed to the runtime.
    pub stories: usize,
    /// Failed stories with their error messages.
    pub failures: Vec<(StoryId, String)>,
    pub elapsed: Duration,
}

impl BatchOutcome {
    pub fn skipped(batch: BatchKey, stories: usize) -> Self {
        Self {
            batch,
            status: BatchStatus::Skipped,
            stories,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn executed(
        batch: BatchKey,
        stories: usize,
        failures: Vec<(StoryId, String)>,
        elapsed: Duration,
    ) -> Self {
        let status = if failures.is_empty() {
            BatchStatus::Passed
        } else {
            BatchStatus::Failed
        };
        Self {
            batch,
            status,
            stories,
            failures,
            elapsed,
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Outcomes of the batches that were reached, in execution order.
    pub batches: Vec<BatchOutcome>,
    /// Set when a failed batch stopped the run before its last batch.
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn outcome(&self, batch: &BatchKey) -> Option<&BatchOutcome> {
        self.batches.iter().find(|outcome| &outcome.batch == batch)
    }

    pub fn failure_count(&self) -> usize {
        self.batches.iter().map(|outcome| outcome.failures.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn executed(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches
            .iter()
            .filter(|outcome| outcome.status != BatchStatus::Skipped)
    }

    pub fn status(&self) -> BatchStatus {
        if self.has_failures() {
            BatchStatus::Failed
        } else {
            BatchStatus::Passed
        }
    }
}
