//! Story discovery.
//!
//! Each batch names a resource root plus include and exclude patterns. Glob
//! patterns are matched relative to the root; patterns prefixed with
//! `regex:` are matched against root-relative paths instead.

mod resolver;
mod story_id;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use resolver::{PathResolver, ResolvedBatches, REGEX_PATTERN_PREFIX};
pub use story_id::StoryId;

/// Errors raised while resolving story paths. They prevent the run from
/// starting.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("resource location '{location}' is not readable: {source}")]
    Root {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid resource locator '{location}': {reason}")]
    Locator { location: String, reason: String },

    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid regex pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk resource directory: {0}")]
    Walk(#[from] ignore::Error),
}

/// Result type for path resolution.
pub type PathResult<T> = Result<T, PathError>;
