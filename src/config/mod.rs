//! Run configuration.
//!
//! Configuration is read once at start-up from a TOML file and `STORYBATCH_`
//! environment overrides. The `runner` table becomes [`RunnerSettings`];
//! every `batch-<N>` key becomes an entry of the [`BatchRegistry`].
//!
//! # Example
//!
//! ```toml
//! [runner]
//! threads = 2
//! story-execution-timeout = "PT1H"
//! ignore-failure-in-batches = false
//!
//! [batch-1]
//! resource-location = "stories"
//! resource-include-patterns = ["smoke/**/*.story"]
//! threads = 1
//!
//! [batch-2]
//! resource-location = "stories"
//! resource-include-patterns = "regression/**/*.story"
//! resource-exclude-patterns = "regression/flaky/*.story"
//! meta-filters = "-skip -wip"
//! ```

mod batch;
mod duration;
mod settings;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

pub use batch::{BatchConfig, BatchKey, BatchRegistry, ExecutionParameters};
pub use duration::{format_duration, parse_duration};
pub use settings::{
    RunnerSettings, DEFAULT_META_FILTER, DEFAULT_STORY_TIMEOUT, DEFAULT_THREADS,
};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "STORYBATCH";

/// Name of the table holding [`RunnerSettings`].
pub const RUNNER_TABLE: &str = "runner";

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'resource-location' is missing for {batch}")]
    MissingResourceLocation { batch: String },

    #[error("invalid batch key '{key}': {reason}")]
    InvalidBatchKey { key: String, reason: String },

    #[error("batch number is configured twice, as '{first}' and '{second}'")]
    DuplicateBatch { first: String, second: String },

    #[error("invalid value for {batch}.{field}: {message}")]
    InvalidValue {
        batch: String,
        field: String,
        message: String,
    },

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("invalid runner settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fully loaded configuration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub settings: RunnerSettings,
    pub registry: BatchRegistry,
    /// Directory that relative resource locations resolve against.
    pub base_dir: PathBuf,
}

impl Configuration {
    /// Loads configuration from an optional TOML file plus the environment.
    ///
    /// Relative resource locations resolve against the file's directory, or
    /// the current directory when no file is given.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of
    /// the process environment when given.
    ///
    /// Overrides use `STORYBATCH_<TABLE>__<KEY>`, for example
    /// `STORYBATCH_RUNNER__IGNORE_FAILURE_IN_BATCHES=true` or
    /// `STORYBATCH_BATCH_2__THREADS=4`.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> ConfigResult<Self> {
        let mut raw: Map<String, Value> = match path {
            Some(path) => config::Config::builder()
                .add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Toml)
                        .required(true),
                )
                .build()?
                .try_deserialize()?,
            None => Map::new(),
        };
        let overrides: Map<String, Value> = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        merge_overrides(&mut raw, overrides);

        let base_dir = path
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_entries(&raw, base_dir)
    }

    /// Builds configuration from already-parsed raw entries.
    pub fn from_entries(raw: &Map<String, Value>, base_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let settings = match raw.get(RUNNER_TABLE) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => RunnerSettings::default(),
        };
        let registry = BatchRegistry::load(raw, &settings)?;
        Ok(Self {
            settings,
            registry,
            base_dir: base_dir.into(),
        })
    }
}

/// Merges environment overrides into the file entries. Environment keys
/// arrive in snake case and are matched against the kebab-case file keys.
fn merge_overrides(target: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, value) in overrides {
        let key = key.replace('_', "-");
        match value {
            Value::Object(nested) => {
                let entry = target
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                match entry {
                    Value::Object(existing) => merge_overrides(existing, nested),
                    other => *other = Value::Object(nested),
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

/// Splits a comma-separated list, dropping blank items.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
