//! Path segment validation and sandbox containment.
//!
//! Every name that reaches the filesystem from a request goes through
//! [`PathSegment`]: a single path component that cannot climb, cannot carry a
//! separator and cannot smuggle control characters into response headers.
//!
//! Segment checks are lexical. [`resolve`] adds the second line of defence:
//! the joined path is canonicalized (symlinks and `.`/`..` resolved) and must
//! still be a component-wise descendant of the canonical sandbox root.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};

static DIRECTORY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_ -]+$").expect("directory name pattern"));

/// A single validated path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathSegment(String);

impl PathSegment {
    /// Validate an untrusted single-segment name (file or directory).
    ///
    /// Rejects empty names, `.`, anything containing `..`, `/` or `\`, and
    /// control characters.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DocspaceError::invalid_path(name, "empty name"));
        }
        if name == "." {
            return Err(DocspaceError::invalid_path(name, "current-directory reference"));
        }
        if name.contains("..") {
            return Err(DocspaceError::invalid_path(name, "parent-directory reference"));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(DocspaceError::invalid_path(name, "contains a path separator"));
        }
        if name.chars().any(char::is_control) {
            return Err(DocspaceError::invalid_path(name, "contains a control character"));
        }
        Ok(Self(name.to_string()))
    }

    /// Validate a name for a new directory.
    ///
    /// The whole name must match `^[A-Za-z0-9_ -]+$`; a matching prefix is
    /// not enough.
    pub fn directory_name(name: &str) -> Result<Self> {
        if !DIRECTORY_NAME.is_match(name) {
            return Err(DocspaceError::InvalidName {
                name: name.to_string(),
            });
        }
        Self::parse(name)
    }

    /// The segment as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased extension after the last `.`, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for PathSegment {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl AsRef<str> for PathSegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PathSegment {
    type Err = DocspaceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathSegment {
    type Error = DocspaceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PathSegment> for String {
    fn from(segment: PathSegment) -> Self {
        segment.0
    }
}

/// Resolve `cursor` plus one untrusted `leaf` to an absolute path under `root`.
///
/// The leaf is re-validated, the result canonicalized, and containment is
/// checked component by component. A leaf that does not exist yet is
/// resolved through its (existing) parent directory.
pub fn resolve(root: &Path, cursor: &NavigationCursor, leaf: &str) -> Result<PathBuf> {
    let leaf = PathSegment::parse(leaf)?;
    let root = root.canonicalize().map_err(|e| DocspaceError::io(root, e))?;
    let parent = root.join(cursor.relative_path());
    let candidate = parent.join(&leaf);

    let canonical = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => parent
            .canonicalize()
            .map_err(|e| DocspaceError::io(cursor.relative_path(), e))?
            .join(&leaf),
        Err(e) => return Err(DocspaceError::io(cursor.relative_path().join(&leaf), e)),
    };

    ensure_contained(&root, &canonical)?;
    debug!(root = %root.display(), path = %canonical.display(), "resolved sandbox path");
    Ok(canonical)
}

/// Check that `path` is `root` or lies beneath it, comparing whole components.
pub fn ensure_contained(root: &Path, path: &Path) -> Result<()> {
    if path.starts_with(root) {
        Ok(())
    } else {
        Err(DocspaceError::SandboxEscape {
            path: path.to_path_buf(),
        })
    }
}
