//! Batch catalogue: keys, per-batch configuration and the ordered registry.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::duration::parse_duration;
use super::settings::RunnerSettings;
use super::{split_list, ConfigError, ConfigResult};

const BATCH_PREFIX: &str = "batch-";

/// Splits `batch-<digits>[.<field>]` into its digits and optional field.
fn split_batch_key(key: &str) -> Option<(&str, Option<&str>)> {
    let rest = key.strip_prefix(BATCH_PREFIX)?;
    let (digits, field) = match rest.split_once('.') {
        Some((digits, field)) if !field.is_empty() => (digits, Some(field)),
        Some(_) => return None,
        None => (rest, None),
    };
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some((digits, field))
}

/// Identifier of a batch, `batch-<N>` with N a positive integer.
///
/// Keys order by N, so `batch-2` runs before `batch-10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey(u32);

impl BatchKey {
    /// Creates a key from its batch number. Returns `None` for zero.
    pub fn new(number: u32) -> Option<Self> {
        (number > 0).then_some(Self(number))
    }

    /// The numeric part of the key.
    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", BATCH_PREFIX, self.0)
    }
}

impl FromStr for BatchKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(BATCH_PREFIX)
            .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ConfigError::InvalidBatchKey {
                key: s.to_string(),
                reason: "expected batch-<positive integer>".to_string(),
            })?;
        parse_batch_number(s, digits)
    }
}

fn parse_batch_number(key: &str, digits: &str) -> ConfigResult<BatchKey> {
    digits
        .parse::<u32>()
        .ok()
        .and_then(BatchKey::new)
        .ok_or_else(|| ConfigError::InvalidBatchKey {
            key: key.to_string(),
            reason: "batch number must be a positive 32-bit integer".to_string(),
        })
}

/// Configuration of a single batch. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub key: BatchKey,
    /// Display name; defaults to the key.
    pub name: String,
    /// Root that include/exclude patterns are resolved against.
    pub resource_location: String,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Worker count; `None` falls back to the run-wide default.
    pub threads: Option<usize>,
    pub story_execution_timeout: Duration,
    pub meta_filters: Vec<String>,
    pub skip: bool,
    /// Overrides the run-wide failure policy for this batch.
    pub ignore_failure: Option<bool>,
}

impl BatchConfig {
    /// A configuration with run-wide defaults and no resource patterns.
    pub fn with_defaults(key: BatchKey, settings: &RunnerSettings) -> Self {
        Self {
            key,
            name: key.to_string(),
            resource_location: String::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            threads: None,
            story_execution_timeout: settings.story_execution_timeout,
            meta_filters: settings.meta_filters.clone(),
            skip: false,
            ignore_failure: None,
        }
    }

    /// Resolves the parameters this batch actually executes with.
    pub fn execution_parameters(&self, settings: &RunnerSettings) -> ExecutionParameters {
        ExecutionParameters {
            threads: self.threads.unwrap_or(settings.threads).max(1),
            story_timeout: self.story_execution_timeout,
            meta_filters: self.meta_filters.clone(),
            ignore_failure: self
                .ignore_failure
                .unwrap_or(settings.ignore_failure_in_batches),
            skip: self.skip,
        }
    }
}

/// Effective execution parameters of a batch after applying defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionParameters {
    pub threads: usize,
    pub story_timeout: Duration,
    pub meta_filters: Vec<String>,
    pub ignore_failure: bool,
    pub skip: bool,
}

/// Ordered catalogue of configured batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRegistry {
    batches: BTreeMap<BatchKey, BatchConfig>,
}

impl BatchRegistry {
    /// Builds the registry from raw configuration entries.
    ///
    /// Only keys shaped `batch-<N>` (optionally followed by `.<field>`) are
    /// considered; everything else is ignored. Two spellings that parse to
    /// the same N (`batch-1`, `batch-01`) are rejected.
    pub fn load<'a, I>(entries: I, settings: &RunnerSettings) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut raw: BTreeMap<BatchKey, (String, Map<String, Value>)> = BTreeMap::new();

        for (key, value) in entries {
            let Some((digits, field)) = split_batch_key(key) else {
                if key.starts_with(BATCH_PREFIX) {
                    debug!(key = %key, "ignoring configuration key that is not a batch key");
                }
                continue;
            };
            let spelled = format!("{BATCH_PREFIX}{digits}");
            let batch_key = parse_batch_number(&spelled, digits)?;

            let (seen_spelling, fields) = raw
                .entry(batch_key)
                .or_insert_with(|| (spelled.clone(), Map::new()));
            if *seen_spelling != spelled {
                return Err(ConfigError::DuplicateBatch {
                    first: seen_spelling.clone(),
                    second: spelled,
                });
            }

            match field {
                Some(field) => {
                    fields.insert(normalize_field(field), value.clone());
                }
                None => match value {
                    Value::Object(map) => {
                        for (field, field_value) in map {
                            fields.insert(normalize_field(field), field_value.clone());
                        }
                    }
                    other => {
                        return Err(ConfigError::InvalidValue {
                            batch: spelled,
                            field: String::new(),
                            message: format!("expected a table of batch settings, got {other}"),
                        })
                    }
                },
            }
        }

        let mut batches = BTreeMap::new();
        for (key, (_, fields)) in raw {
            batches.insert(key, parse_batch(key, &fields, settings)?);
        }
        Ok(Self { batches })
    }

    /// Creates a registry from already-built configurations.
    pub fn from_configs(configs: impl IntoIterator<Item = BatchConfig>) -> Self {
        Self {
            batches: configs.into_iter().map(|c| (c.key, c)).collect(),
        }
    }

    pub fn get_batch(&self, key: &BatchKey) -> Option<&BatchConfig> {
        self.batches.get(key)
    }

    /// The configured batch, or a default configuration named after the key.
    pub fn batch_or_default(&self, key: &BatchKey, settings: &RunnerSettings) -> BatchConfig {
        self.batches
            .get(key)
            .cloned()
            .unwrap_or_else(|| BatchConfig::with_defaults(*key, settings))
    }

    /// Batch keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &BatchKey> {
        self.batches.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, BatchKey, BatchConfig> {
        self.batches.iter()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<'a> IntoIterator for &'a BatchRegistry {
    type Item = (&'a BatchKey, &'a BatchConfig);
    type IntoIter = btree_map::Iter<'a, BatchKey, BatchConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn normalize_field(field: &str) -> String {
    field.trim().to_ascii_lowercase().replace('_', "-")
}

fn parse_batch(
    key: BatchKey,
    fields: &Map<String, Value>,
    settings: &RunnerSettings,
) -> ConfigResult<BatchConfig> {
    let batch = key.to_string();
    let mut config = BatchConfig::with_defaults(key, settings);
    let mut location = None;

    for (field, value) in fields {
        let invalid = |message: String| ConfigError::InvalidValue {
            batch: batch.clone(),
            field: field.to_string(),
            message,
        };
        match field.as_str() {
            "name" => config.name = scalar(value).map_err(invalid)?,
            "resource-location" => location = Some(scalar(value).map_err(invalid)?),
            "resource-include-patterns" => {
                config.include_patterns = list(value).map_err(invalid)?
            }
            "resource-exclude-patterns" => {
                config.exclude_patterns = list(value).map_err(invalid)?
            }
            "threads" => config.threads = Some(threads(value).map_err(invalid)?),
            "story-execution-timeout" => {
                config.story_execution_timeout = match value {
                    Value::Number(n) => n
                        .as_u64()
                        .map(Duration::from_secs)
                        .ok_or_else(|| invalid(format!("invalid timeout {n}")))?,
                    other => {
                        let text = scalar(other).map_err(invalid)?;
                        parse_duration(&text).map_err(|e| invalid(e.to_string()))?
                    }
                }
            }
            "meta-filters" => config.meta_filters = list(value).map_err(invalid)?,
            "skip" => config.skip = boolean(value).map_err(invalid)?,
            "ignore-failure" => config.ignore_failure = Some(boolean(value).map_err(invalid)?),
            other => warn!(batch = %batch, field = other, "ignoring unknown batch setting"),
        }
    }

    config.resource_location = location.ok_or(ConfigError::MissingResourceLocation { batch })?;
    Ok(config)
}

fn scalar(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected a scalar value, got {other}")),
    }
}

fn list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(scalar)
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect(),
        other => scalar(other).map(|s| split_list(&s)),
    }
}

fn boolean(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => {
            let text = scalar(other)?;
            match text.to_ascii_lowercase().as_str() {
                "" | "false" => Ok(false),
                "true" => Ok(true),
                _ => Err(format!("expected true or false, got '{text}'")),
            }
        }
    }
}

fn threads(value: &Value) -> Result<usize, String> {
    let text = scalar(value)?;
    match text.parse::<usize>() {
        Ok(0) => Err("thread count must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("expected a thread count, got '{text}'")),
    }
}
