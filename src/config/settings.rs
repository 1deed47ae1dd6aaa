//! Global runner settings.
//!
//! These are the run-wide defaults that every batch falls back to when it
//! does not override a value, plus the flags that govern the run as a whole.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::duration::parse_duration;

/// Default number of worker threads per batch.
pub const DEFAULT_THREADS: usize = 1;

/// Default per-story execution timeout: 3 hours.
pub const DEFAULT_STORY_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);

/// Default meta filter applied when neither the run nor the batch sets one.
pub const DEFAULT_META_FILTER: &str = "-skip";

/// Run-wide settings, read from the `runner` table of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunnerSettings {
    /// Worker threads used by batches that do not set `threads`.
    pub threads: usize,

    /// Per-story timeout used by batches that do not set one.
    #[serde(deserialize_with = "deserialize_duration")]
    pub story_execution_timeout: Duration,

    /// Meta filters used by batches that do not set `meta-filters`.
    #[serde(deserialize_with = "deserialize_string_list")]
    pub meta_filters: Vec<String>,

    /// When false, a batch that ends with failures stops the run.
    pub ignore_failure_in_batches: bool,

    /// Generate the report view once after all batches.
    pub generate_view_after_batches: bool,

    /// Walk stories through the reporters without executing them.
    pub dry_run: bool,

    /// Directory receiving the event log and report view.
    pub report_dir: PathBuf,

    /// Shell command executing a single story.
    pub story_command: Option<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            story_execution_timeout: DEFAULT_STORY_TIMEOUT,
            meta_filters: vec![DEFAULT_META_FILTER.to_string()],
            ignore_failure_in_batches: false,
            generate_view_after_batches: false,
            dry_run: false,
            report_dir: PathBuf::from("output"),
            story_command: None,
        }
    }
}

impl RunnerSettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the default per-story timeout.
    pub fn with_story_execution_timeout(mut self, timeout: Duration) -> Self {
        self.story_execution_timeout = timeout;
        self
    }

    /// Sets the default meta filters.
    pub fn with_meta_filters(mut self, filters: Vec<String>) -> Self {
        self.meta_filters = filters;
        self
    }

    /// Sets whether batch failures are ignored when deciding to continue.
    pub fn with_ignore_failure_in_batches(mut self, ignore: bool) -> Self {
        self.ignore_failure_in_batches = ignore;
        self
    }

    /// Sets whether the report view is generated after all batches.
    pub fn with_generate_view_after_batches(mut self, generate: bool) -> Self {
        self.generate_view_after_batches = generate;
        self
    }

    /// Sets dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the report directory.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Sets the story command.
    pub fn with_story_command(mut self, command: impl Into<String>) -> Self {
        self.story_command = Some(command.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawList {
    One(String),
    Many(Vec<String>),
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawList::deserialize(deserializer)? {
        RawList::One(value) => super::split_list(&value),
        RawList::Many(values) => values,
    })
}
