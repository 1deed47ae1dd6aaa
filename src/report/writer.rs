use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::events::{RunEvent, RunEventType};
use super::store::EventStore;
use super::ReportResult;
use crate::config::BatchKey;

/// Records run lifecycle events to the event log.
///
/// Write failures are logged and swallowed.
#[derive(Debug, Clone)]
pub struct EventWriter {
    run_id: String,
    store: EventStore,
}

impl EventWriter {
    pub fn try_new(report_dir: &Path, run_id: impl Into<String>) -> ReportResult<Self> {
        Ok(Self {
            run_id: run_id.into(),
            store: EventStore::new(report_dir)?,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn emit_run_start(&self, batches: usize, stories: usize) {
        self.write_event(RunEvent {
            batches: Some(batches),
            ..self.event(RunEventType::RunStart).with_stories(stories)
        });
    }

    pub fn emit_batch_start(&self, batch: BatchKey, stories: usize, threads: usize) {
        self.write_event(
            self.event(RunEventType::BatchStart)
                .with_batch(batch)
                .with_stories(stories)
                .with_threads(threads),
        );
    }

    pub fn emit_batch_skipped(&self, batch: BatchKey) {
        self.write_event(
            self.event(RunEventType::BatchSkipped)
                .with_batch(batch)
                .with_status("skipped"),
        );
    }

    pub fn emit_batch_complete(&self, batch: BatchKey, failures: usize) {
        let status = if failures == 0 { "passed" } else { "failed" };
        self.write_event(
            self.event(RunEventType::BatchComplete)
                .with_batch(batch)
                .with_failures(failures)
                .with_status(status),
        );
    }

    pub fn emit_run_complete(&self, status: impl Into<String>, failures: usize) {
        self.write_event(
            self.event(RunEventType::RunComplete)
                .with_failures(failures)
                .with_status(status),
        );
    }

    fn event(&self, event_type: RunEventType) -> RunEvent {
        RunEvent::new(event_type, self.run_id.clone())
    }

    fn write_event(&self, event: RunEvent) {
        if let Err(err) = self.store.append(&event) {
            warn!(
                dir = %self.store.root_dir().display(),
                event = ?event.event_type,
                error = %err,
                "failed to write run event"
            );
        }
    }
}

pub fn generate_run_id() -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("run-{}-{}", timestamp_ms, pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(n: u32) -> BatchKey {
        BatchKey::new(n).expect("key")
    }

    #[test]
    fn test_events_are_written_in_order() {
        let temp_dir = TempDir::new().expect("temp dir");
        let writer = EventWriter::try_new(temp_dir.path(), "run-42").expect("writer");

        writer.emit_run_start(2, 5);
        writer.emit_batch_start(key(1), 2, 1);
        writer.emit_batch_complete(key(1), 1);
        writer.emit_batch_skipped(key(2));
        writer.emit_run_complete("failed", 1);

        let events = writer.store().read_events("run-42").expect("events");
        let types: Vec<RunEventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                RunEventType::RunStart,
                RunEventType::BatchStart,
                RunEventType::BatchComplete,
                RunEventType::BatchSkipped,
                RunEventType::RunComplete,
            ]
        );
        assert_eq!(events[0].batches, Some(2));
        assert_eq!(events[0].stories, Some(5));
        assert_eq!(events[1].threads, Some(1));
        assert_eq!(events[2].status.as_deref(), Some("failed"));
        assert_eq!(events[3].batch.as_deref(), Some("batch-2"));
        assert!(events.iter().all(|e| e.run_id == "run-42"));
    }

    #[test]
    fn test_write_failures_are_swallowed() {
        let temp_dir = TempDir::new().expect("temp dir");
        let writer = EventWriter::try_new(temp_dir.path(), "").expect("writer");
        writer.emit_run_start(0, 0);
        writer.emit_run_complete("passed", 0);
    }

    #[test]
    fn test_generate_run_id_format() {
        let run_id = generate_run_id();
        assert!(run_id.starts_with("run-"));
        assert!(run_id.ends_with(&format!("-{}", std::process::id())));
    }
}
