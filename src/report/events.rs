use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current event log schema version.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Lifecycle event types of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    RunStart,
    BatchStart,
    BatchSkipped,
    BatchComplete,
    RunComplete,
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub schema_version: u32,
    pub event_type: RunEventType,
    pub timestamp: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stories: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RunEvent {
    pub fn new(event_type: RunEventType, run_id: impl Into<String>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event_type,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: run_id.into(),
            batch: None,
            batches: None,
            stories: None,
            threads: None,
            failures: None,
            status: None,
        }
    }

    pub fn with_batch(mut self, batch: impl ToString) -> Self {
        self.batch = Some(batch.to_string());
        self
    }

    pub fn with_stories(mut self, stories: usize) -> Self {
        self.stories = Some(stories);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = Some(failures);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Manifest stored next to the event log of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_count: u64,
}

impl RunManifest {
    pub fn new(run_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            run_id: run_id.into(),
            created_at: timestamp,
            updated_at: timestamp,
            event_count: 0,
        }
    }

    /// Accounts for a newly appended event.
    pub fn record(&mut self, timestamp: DateTime<Utc>) {
        self.updated_at = timestamp;
        self.event_count = self.event_count.saturating_add(1);
    }
}
