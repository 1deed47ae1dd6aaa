//! Run reporting: the lifecycle event log, run statistics and the report
//! view generated after the last batch.
//!
//! Everything here is best effort. Write failures surface as
//! [`ReportError`] and are logged by the caller; they never change the
//! outcome of a batch.

mod events;
mod statistics;
mod store;
mod view;
mod writer;

use std::io;

use thiserror::Error;

pub use events::{RunEvent, RunEventType, RunManifest, EVENT_SCHEMA_VERSION};
pub use statistics::{RunStatistics, Statistics, Tally};
pub use store::EventStore;
pub use view::JsonViewGenerator;
pub use writer::{generate_run_id, EventWriter};

/// Errors that can occur while writing reports.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid run ID")]
    InvalidRunId,
}

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Produces the aggregated report view of a run.
pub trait ReportGenerator: Send + Sync {
    fn generate_view(&self) -> ReportResult<()>;
}
