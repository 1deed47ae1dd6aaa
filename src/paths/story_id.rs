use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::{PathError, PathResult};
use crate::lifecycle::Stage;

/// Absolute, normalized identifier of a story resource.
///
/// The identifier is the decoded filesystem path with `/` separators, so a
/// story named `a+b.story` keeps its literal `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(String);

impl StoryId {
    /// Builds an identifier from an absolute filesystem path.
    pub fn from_path(path: &Path) -> Self {
        let text = path.to_string_lossy();
        if cfg!(windows) {
            Self(text.replace('\\', "/"))
        } else {
            Self(text.into_owned())
        }
    }

    /// Parses a resource locator: either a `file:` URL (percent-encoded) or
    /// a plain absolute path.
    pub fn from_locator(locator: &str) -> PathResult<Self> {
        if locator.starts_with("file:") {
            return decode_file_url(locator).map(|path| Self::from_path(&path));
        }
        let path = Path::new(locator);
        if !path.is_absolute() {
            return Err(PathError::Locator {
                location: locator.to_string(),
                reason: "story identifiers must be absolute".to_string(),
            });
        }
        Ok(Self::from_path(path))
    }

    /// Pseudo-story standing for the suite hooks of `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Before => Self("BeforeStories".to_string()),
            Stage::After => Self("AfterStories".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Final path component, used as the story's short name.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The identifier as a `file:` URL.
    pub fn to_url(&self) -> Option<Url> {
        Url::from_file_path(self.as_path()).ok()
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decodes a `file:` URL into a filesystem path.
///
/// Percent escapes are decoded (`%2B` becomes `+`) while a literal `+` is
/// kept as is, never read as an encoded space.
pub(crate) fn decode_file_url(locator: &str) -> PathResult<PathBuf> {
    let url = Url::parse(locator).map_err(|e| PathError::Locator {
        location: locator.to_string(),
        reason: e.to_string(),
    })?;
    url.to_file_path().map_err(|()| PathError::Locator {
        location: locator.to_string(),
        reason: "not a local file URL".to_string(),
    })
}
