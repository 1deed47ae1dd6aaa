use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::events::{RunEvent, RunManifest};
use super::{ReportError, ReportResult};

const EVENTS_DIR_NAME: &str = "events";
const MANIFEST_FILE_NAME: &str = "run.json";
const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Event log backed by the local filesystem:
/// `<report-dir>/events/<run-id>/events.jsonl` plus a `run.json` manifest.
#[derive(Debug, Clone)]
pub struct EventStore {
    root_dir: PathBuf,
}

impl EventStore {
    /// Creates the store under `report_dir`.
    pub fn new(report_dir: impl AsRef<Path>) -> ReportResult<Self> {
        let root_dir = report_dir.as_ref().join(EVENTS_DIR_NAME);
        fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    /// Appends one event to its run's log and updates the manifest.
    pub fn append(&self, event: &RunEvent) -> ReportResult<()> {
        let run_dir = self.run_dir(&event.run_id)?;
        fs::create_dir_all(&run_dir)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_dir.join(EVENTS_FILE_NAME))?;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        file.sync_all()?;

        let now = Utc::now();
        let mut manifest = self
            .read_manifest(&event.run_id)?
            .unwrap_or_else(|| RunManifest::new(event.run_id.clone(), now));
        manifest.record(now);
        self.write_manifest(&run_dir, &manifest)
    }

    /// Events of a run in the order they were written.
    pub fn read_events(&self, run_id: &str) -> ReportResult<Vec<RunEvent>> {
        let path = self.run_dir(run_id)?.join(EVENTS_FILE_NAME);
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ReportError::Io(err)),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(ReportError::from))
            .collect()
    }

    pub fn read_manifest(&self, run_id: &str) -> ReportResult<Option<RunManifest>> {
        let path = self.run_dir(run_id)?.join(MANIFEST_FILE_NAME);
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ReportError::Io(err)),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> ReportResult<PathBuf> {
        let run_id = run_id.trim();
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id == ".." {
            return Err(ReportError::InvalidRunId);
        }
        Ok(self.root_dir.join(run_id))
    }

    fn write_manifest(&self, run_dir: &Path, manifest: &RunManifest) -> ReportResult<()> {
        write_atomically(
            &run_dir.join(MANIFEST_FILE_NAME),
            serde_json::to_string_pretty(manifest)?.as_bytes(),
        )
    }
}

/// Writes through a temporary sibling file renamed over `path`.
pub(super) fn write_atomically(path: &Path, content: &[u8]) -> ReportResult<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunEventType;
    use tempfile::TempDir;

    #[test]
    fn test_append_writes_log_and_manifest() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = EventStore::new(temp_dir.path()).expect("store");

        store
            .append(&RunEvent::new(RunEventType::RunStart, "run-1"))
            .expect("append");
        store
            .append(&RunEvent::new(RunEventType::BatchStart, "run-1").with_batch("batch-1"))
            .expect("append");

        let run_dir = temp_dir.path().join("events").join("run-1");
        assert!(run_dir.join(EVENTS_FILE_NAME).exists());
        assert!(!run_dir.join("run.json.tmp").exists());

        let events = store.read_events("run-1").expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, RunEventType::BatchStart);
        assert_eq!(events[1].batch.as_deref(), Some("batch-1"));

        let manifest = store.read_manifest("run-1").expect("read").expect("manifest");
        assert_eq!(manifest.event_count, 2);
        assert!(manifest.updated_at >= manifest.created_at);
    }

    #[test]
    fn test_invalid_run_ids_are_rejected() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = EventStore::new(temp_dir.path()).expect("store");
        for run_id in ["", "  ", "../escape", ".."] {
            let result = store.append(&RunEvent::new(RunEventType::RunStart, run_id));
            assert!(matches!(result, Err(ReportError::InvalidRunId)), "{run_id}");
        }
    }

    #[test]
    fn test_missing_run_has_no_events() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = EventStore::new(temp_dir.path()).expect("store");
        assert!(store.read_events("run-unknown").expect("events").is_empty());
        assert!(store.read_manifest("run-unknown").expect("manifest").is_none());
    }
}
