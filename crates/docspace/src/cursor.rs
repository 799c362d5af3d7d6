//! Per-session "current directory" within one workspace tree.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocspaceError, Result};
use crate::segment::PathSegment;
use crate::tree::WorkspaceTree;

/// Position inside a [`WorkspaceTree`], relative to its root.
///
/// Renders as `/` at the root and `/a/b/` below it. Only [`descend`] and
/// [`ascend`] move it, so every segment it holds has passed validation.
///
/// [`descend`]: NavigationCursor::descend
/// [`ascend`]: NavigationCursor::ascend
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NavigationCursor {
    segments: Vec<PathSegment>,
}

impl NavigationCursor {
    /// A cursor at the tree root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Enter the sub-directory `name`.
    ///
    /// The cursor only moves when the resulting location is an existing
    /// directory inside the tree; otherwise it is left untouched.
    pub fn descend(&mut self, tree: &WorkspaceTree, name: &str) -> Result<()> {
        let segment = PathSegment::parse(name)?;
        let mut next = self.clone();
        next.segments.push(segment);

        if !tree.is_directory(&next) {
            return Err(DocspaceError::invalid_path(
                next.to_string(),
                "not an existing directory",
            ));
        }

        debug!(tree = %tree.kind(), from = %self, to = %next, "descend");
        *self = next;
        Ok(())
    }

    /// Leave the current directory. At the root this does nothing.
    ///
    /// Returns whether the cursor moved.
    pub fn ascend(&mut self) -> bool {
        self.segments.pop().is_some()
    }

    /// Whether the cursor is at the tree root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The validated segments, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The cursor as a relative path (empty at the root).
    pub fn relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Path of `leaf` inside the current directory, relative to the root.
    pub fn join(&self, leaf: &PathSegment) -> PathBuf {
        self.relative_path().join(leaf)
    }
}

impl fmt::Display for NavigationCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        for segment in &self.segments {
            write!(f, "{segment}/")?;
        }
        Ok(())
    }
}

impl FromStr for NavigationCursor {
    type Err = DocspaceError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "/" {
            return Ok(Self::root());
        }

        let inner = s
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or_else(|| DocspaceError::invalid_path(s, "cursor must start and end with '/'"))?;

        let segments = inner
            .split('/')
            .map(PathSegment::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }
}

impl TryFrom<String> for NavigationCursor {
    type Error = DocspaceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NavigationCursor> for String {
    fn from(cursor: NavigationCursor) -> Self {
        cursor.to_string()
    }
}
