use std::fmt;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use regex::Regex;
use tracing::debug;

use super::story_id::decode_file_url;
use super::{PathError, PathResult, StoryId};
use crate::config::{BatchConfig, BatchKey, BatchRegistry};

/// Prefix marking a pattern as a regular expression instead of a glob.
pub const REGEX_PATTERN_PREFIX: &str = "regex:";

/// Expands batch resource patterns into ordered story lists.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    /// Creates a resolver; relative resource locations resolve against
    /// `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolves the stories of a single batch.
    ///
    /// Include matches are accumulated in pattern order, exclude matches are
    /// removed by exact identifier, and the rest is sorted and de-duplicated.
    pub fn find_paths(&self, batch: &BatchConfig) -> PathResult<Vec<StoryId>> {
        if batch.include_patterns.is_empty() {
            return Ok(Vec::new());
        }
        let root = self.resolve_root(&batch.resource_location)?;

        let mut stories = Vec::new();
        for pattern in &batch.include_patterns {
            stories.extend(matches(&root, pattern)?);
        }
        for pattern in &batch.exclude_patterns {
            let excluded = matches(&root, pattern)?;
            stories.retain(|story| !excluded.contains(story));
        }
        stories.sort();
        stories.dedup();

        debug!(
            batch = %batch.key,
            root = %root.display(),
            stories = stories.len(),
            "resolved batch stories"
        );
        Ok(stories)
    }

    /// Resolves every batch of the registry, preserving registry order.
    pub fn find_all(&self, registry: &BatchRegistry) -> PathResult<ResolvedBatches> {
        let mut batches = Vec::with_capacity(registry.len());
        for (key, config) in registry {
            batches.push((*key, self.find_paths(config)?));
        }
        Ok(ResolvedBatches { batches })
    }

    /// Turns a resource location into a canonical directory.
    fn resolve_root(&self, location: &str) -> PathResult<PathBuf> {
        let path = if location.starts_with("file:") {
            decode_file_url(location)?
        } else if location.is_empty() {
            self.base_dir.clone()
        } else {
            self.base_dir.join(location)
        };
        path.canonicalize().map_err(|source| PathError::Root {
            location: location.to_string(),
            source,
        })
    }
}

/// Identifiers matched by one include or exclude pattern.
fn matches(root: &Path, pattern: &str) -> PathResult<Vec<StoryId>> {
    match pattern.strip_prefix(REGEX_PATTERN_PREFIX) {
        Some(expression) => regex_matches(root, expression),
        None => glob_matches(root, pattern),
    }
}

fn glob_matches(root: &Path, pattern: &str) -> PathResult<Vec<StoryId>> {
    let relative = pattern.trim().trim_start_matches('/');
    let full = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        relative
    );
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let entries = glob::glob_with(&full, options).map_err(|source| PathError::Glob {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PathError::Io {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if path.is_file() {
            found.push(StoryId::from_path(&path));
        }
    }
    Ok(found)
}

fn regex_matches(root: &Path, expression: &str) -> PathResult<Vec<StoryId>> {
    let regex = Regex::new(&format!("^(?:{expression})$")).map_err(|source| PathError::Regex {
        pattern: expression.to_string(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if regex.is_match(&relative) {
            found.push(StoryId::from_path(entry.path()));
        }
    }
    Ok(found)
}

/// Stories of every batch, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBatches {
    batches: Vec<(BatchKey, Vec<StoryId>)>,
}

impl ResolvedBatches {
    /// Builds a plan directly, sorting it by batch key.
    pub fn from_batches(batches: impl IntoIterator<Item = (BatchKey, Vec<StoryId>)>) -> Self {
        let mut batches: Vec<_> = batches.into_iter().collect();
        batches.sort_by_key(|(key, _)| *key);
        Self { batches }
    }

    pub fn get(&self, key: &BatchKey) -> Option<&[StoryId]> {
        self.batches
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, stories)| stories.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BatchKey, &[StoryId])> {
        self.batches.iter().map(|(key, stories)| (key, stories.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn story_count(&self) -> usize {
        self.batches.iter().map(|(_, stories)| stories.len()).sum()
    }
}

/// Renders the execution plan, one line per story.
impl fmt::Display for ResolvedBatches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, stories) in &self.batches {
            writeln!(f, "{key}:")?;
            if stories.is_empty() {
                writeln!(f, "  [no stories found]")?;
            }
            for story in stories {
                writeln!(f, "  {story}")?;
            }
        }
        Ok(())
    }
}
