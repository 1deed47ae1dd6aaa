use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use super::statistics::{RunStatistics, Statistics};
use super::store::write_atomically;
use super::{ReportGenerator, ReportResult};

const VIEW_FILE_NAME: &str = "view.json";

#[derive(Serialize)]
struct View<'a> {
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    statistics: Statistics,
}

/// Writes the run statistics to `<report-dir>/view.json`.
#[derive(Debug, Clone)]
pub struct JsonViewGenerator {
    path: PathBuf,
    run_id: Option<String>,
    statistics: RunStatistics,
}

impl JsonViewGenerator {
    pub fn new(report_dir: impl AsRef<Path>, statistics: RunStatistics) -> Self {
        Self {
            path: report_dir.as_ref().join(VIEW_FILE_NAME),
            run_id: None,
            statistics,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportGenerator for JsonViewGenerator {
    fn generate_view(&self) -> ReportResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let view = View {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: self.run_id.as_deref(),
            statistics: self.statistics.snapshot(),
        };
        write_atomically(&self.path, serde_json::to_string_pretty(&view)?.as_bytes())?;
        info!(path = %self.path.display(), "report view generated");
        Ok(())
    }
}
