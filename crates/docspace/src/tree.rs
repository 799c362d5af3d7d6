//! Per-user sandbox trees backed by capability directory handles.
//!
//! A [`WorkspaceTree`] holds a `cap-std` handle on `<base>/<owner>/`. All
//! listing, creation and deletion go through that handle, so the kernel
//! resolves every relative path against the sandbox root:
//!
//! - **Symlink escapes** are refused by `cap-std` path resolution
//! - **`..` traversal** is rejected before the handle is even used
//! - **Absolute paths** never reach the handle; segments cannot contain `/`
//!
//! ## Deletion is not transactional
//!
//! [`WorkspaceTree::delete_directory_recursive`] removes children before
//! parents and stops at the first failure. Entries already removed stay
//! removed; the error names the path that failed. Use
//! [`WorkspaceTree::plan_directory_removal`] to see what would go first.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use cap_std::fs::{Dir, FileType, Metadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};
use crate::segment::{self, PathSegment};
use crate::upload::UPLOAD_TEMP_PREFIX;

/// Which of a user's two sandboxes a tree is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    /// Uploaded source documents.
    Received,
    /// Converter output.
    Generated,
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeKind::Received => f.write_str("received"),
            TreeKind::Generated => f.write_str("generated"),
        }
    }
}

/// Base directories under which per-user trees live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRoots {
    /// Base for received trees.
    pub received: PathBuf,
    /// Base for generated trees.
    pub generated: PathBuf,
}

impl TreeRoots {
    /// The base directory for `kind`.
    pub fn base_for(&self, kind: TreeKind) -> &Path {
        match kind {
            TreeKind::Received => &self.received,
            TreeKind::Generated => &self.generated,
        }
    }
}

/// Kind of a directory entry, taken from the entry itself, never from a
/// symlink target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file (or anything that is neither a directory nor a link).
    File,
    /// Directory.
    Directory,
    /// Symbolic link. Deletes unlink it; archives skip it.
    Link,
}

impl EntryKind {
    pub(crate) fn of(file_type: &FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Link
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// One listed entry of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Leaf name.
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories and links).
    pub size: u64,
}

impl Entry {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        let kind = EntryKind::of(&metadata.file_type());
        let size = if kind == EntryKind::File { metadata.len() } else { 0 };
        Self { name, kind, size }
    }

    /// Whether the entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Whether the entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One step of a recursive removal, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRemoval {
    /// Path relative to the tree root.
    pub path: PathBuf,
    /// What is removed at this step.
    pub kind: EntryKind,
}

/// Result of a multi-name delete command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Names that were removed.
    pub removed: Vec<String>,
    /// Names that were skipped because they had the wrong kind.
    pub skipped: Vec<String>,
    /// Filesystem entries removed in total, descendants included.
    pub entries_removed: usize,
}

/// A sandboxed directory tree owned by one user.
pub struct WorkspaceTree {
    owner_id: i64,
    kind: TreeKind,
    /// Capability handle on the tree root.
    root: Dir,
    /// Canonical absolute root, for resolution and messages.
    root_path: PathBuf,
}

impl WorkspaceTree {
    /// Open (creating when missing) the tree `<base>/<owner_id>/`.
    pub fn open(base: impl AsRef<Path>, owner_id: i64, kind: TreeKind) -> Result<Self> {
        if owner_id < 0 {
            return Err(DocspaceError::invalid_path(
                owner_id.to_string(),
                "owner id must not be negative",
            ));
        }

        let root_path = base.as_ref().join(owner_id.to_string());
        std::fs::create_dir_all(&root_path).map_err(|e| DocspaceError::io(&root_path, e))?;
        let root_path = root_path
            .canonicalize()
            .map_err(|e| DocspaceError::io(&root_path, e))?;
        let root = Dir::open_ambient_dir(&root_path, cap_std::ambient_authority())
            .map_err(|e| DocspaceError::io(&root_path, e))?;

        debug!(owner = owner_id, tree = %kind, root = %root_path.display(), "opened tree");
        Ok(Self {
            owner_id,
            kind,
            root,
            root_path,
        })
    }

    /// Owning user.
    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    /// Received or generated.
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// Canonical absolute path of the root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// List the directory the cursor points at.
    ///
    /// Directories come first, then files, each group sorted by name.
    /// In-flight upload temp files are hidden.
    pub fn list(&self, cursor: &NavigationCursor) -> Result<Vec<Entry>> {
        let dir = self.cursor_dir(cursor)?;
        let rel = cursor.relative_path();
        let mut entries = Vec::new();

        for item in dir.entries().map_err(|e| DocspaceError::io(&rel, e))? {
            let item = item.map_err(|e| DocspaceError::io(&rel, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with(UPLOAD_TEMP_PREFIX) {
                continue;
            }
            let metadata = dir
                .symlink_metadata(item.file_name())
                .map_err(|e| DocspaceError::io(rel.join(&name), e))?;
            entries.push(Entry::from_metadata(name, &metadata));
        }

        entries.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    /// Describe the single entry `name` in the cursor directory, classified
    /// the same way [`list`](Self::list) classifies it.
    pub fn entry(&self, cursor: &NavigationCursor, name: &str) -> Result<Entry> {
        let segment = PathSegment::parse(name)?;
        let rel = cursor.join(&segment);
        let metadata = self
            .root
            .symlink_metadata(&rel)
            .map_err(|e| DocspaceError::io(&rel, e))?;
        Ok(Entry::from_metadata(segment.into(), &metadata))
    }

    /// Whether the cursor points at an existing directory of this tree.
    pub fn is_directory(&self, cursor: &NavigationCursor) -> bool {
        cursor.is_root() || self.root.is_dir(cursor.relative_path())
    }

    /// Create exactly one new directory `name` in the cursor directory.
    pub fn create_directory(&self, cursor: &NavigationCursor, name: &str) -> Result<PathSegment> {
        let segment = PathSegment::directory_name(name)?;
        let rel = cursor.join(&segment);

        self.root
            .create_dir(&rel)
            .map_err(|e| DocspaceError::io(&rel, e))?;

        info!(owner = self.owner_id, tree = %self.kind, path = %rel.display(), "created directory");
        Ok(segment)
    }

    /// Remove exactly one file. Directories are refused.
    pub fn delete_file(&self, cursor: &NavigationCursor, name: &str) -> Result<()> {
        let segment = PathSegment::parse(name)?;
        let rel = cursor.join(&segment);

        let metadata = self
            .root
            .symlink_metadata(&rel)
            .map_err(|e| DocspaceError::io(&rel, e))?;
        if metadata.is_dir() {
            return Err(DocspaceError::IsDirectory { path: rel });
        }

        self.root
            .remove_file(&rel)
            .map_err(|e| DocspaceError::io(&rel, e))?;

        info!(owner = self.owner_id, tree = %self.kind, path = %rel.display(), "deleted file");
        Ok(())
    }

    /// List everything a recursive removal of `name` would delete, children
    /// before parents, the directory itself last. Nothing is modified.
    pub fn plan_directory_removal(
        &self,
        cursor: &NavigationCursor,
        name: &str,
    ) -> Result<Vec<PlannedRemoval>> {
        let rel = self.directory_target(cursor, name)?;
        let mut plan = Vec::new();
        walk_plan(&self.root, &rel, &mut plan)?;
        plan.push(PlannedRemoval {
            path: rel,
            kind: EntryKind::Directory,
        });
        Ok(plan)
    }

    /// Remove the directory `name` with all its descendants, depth first.
    ///
    /// Returns the number of entries removed, the directory included. Stops
    /// at the first failure without restoring anything.
    pub fn delete_directory_recursive(&self, cursor: &NavigationCursor, name: &str) -> Result<usize> {
        let rel = self.directory_target(cursor, name)?;
        let removed = remove_tree(&self.root, &rel).inspect_err(|e| {
            warn!(
                owner = self.owner_id,
                tree = %self.kind,
                path = %rel.display(),
                error = %e,
                "recursive delete aborted; tree may be partially removed"
            );
        })?;

        info!(
            owner = self.owner_id,
            tree = %self.kind,
            path = %rel.display(),
            removed,
            "removed directory"
        );
        Ok(removed)
    }

    /// Delete every named file; named directories are skipped.
    ///
    /// All names are validated and looked up before the first removal.
    pub fn delete_selected(&self, cursor: &NavigationCursor, names: &[String]) -> Result<BatchOutcome> {
        let classified = self.classify(cursor, names)?;
        let mut outcome = BatchOutcome::default();

        for entry in classified {
            if entry.is_directory() {
                debug!(name = %entry.name, "skipping directory in file delete");
                outcome.skipped.push(entry.name);
            } else {
                self.delete_file(cursor, &entry.name)?;
                outcome.entries_removed += 1;
                outcome.removed.push(entry.name);
            }
        }
        Ok(outcome)
    }

    /// Recursively delete every named directory; named files are skipped.
    ///
    /// All names are validated and looked up before the first removal.
    pub fn remove_directories(
        &self,
        cursor: &NavigationCursor,
        names: &[String],
    ) -> Result<BatchOutcome> {
        let classified = self.classify(cursor, names)?;
        let mut outcome = BatchOutcome::default();

        for entry in classified {
            if entry.is_directory() {
                outcome.entries_removed += self.delete_directory_recursive(cursor, &entry.name)?;
                outcome.removed.push(entry.name);
            } else {
                debug!(name = %entry.name, "skipping file in directory removal");
                outcome.skipped.push(entry.name);
            }
        }
        Ok(outcome)
    }

    /// Canonical absolute path of `name` in the cursor directory.
    pub fn resolve(&self, cursor: &NavigationCursor, name: &str) -> Result<PathBuf> {
        segment::resolve(&self.root_path, cursor, name)
    }

    /// Absolute path of an existing file, for reading.
    pub fn resolve_for_read(&self, cursor: &NavigationCursor, name: &str) -> Result<PathBuf> {
        let entry = self.entry(cursor, name)?;
        if entry.is_directory() {
            return Err(DocspaceError::IsDirectory {
                path: cursor.relative_path().join(&entry.name),
            });
        }
        self.resolve(cursor, name)
    }

    /// Absolute path of the cursor directory.
    pub fn absolute_dir(&self, cursor: &NavigationCursor) -> Result<PathBuf> {
        let path = self.root_path.join(cursor.relative_path());
        let canonical = path
            .canonicalize()
            .map_err(|e| DocspaceError::io(cursor.relative_path(), e))?;
        segment::ensure_contained(&self.root_path, &canonical)?;
        Ok(canonical)
    }

    /// Capability handle on the cursor directory.
    pub(crate) fn cursor_dir(&self, cursor: &NavigationCursor) -> Result<Dir> {
        let rel = cursor.relative_path();
        let dir = if cursor.is_root() {
            self.root.try_clone()
        } else {
            self.root.open_dir(&rel)
        };
        dir.map_err(|e| DocspaceError::io(&rel, e))
    }

    fn directory_target(&self, cursor: &NavigationCursor, name: &str) -> Result<PathBuf> {
        let segment = PathSegment::parse(name)?;
        let rel = cursor.join(&segment);
        let metadata = self
            .root
            .symlink_metadata(&rel)
            .map_err(|e| DocspaceError::io(&rel, e))?;
        if !metadata.is_dir() {
            return Err(DocspaceError::invalid_path(name, "not a directory"));
        }
        Ok(rel)
    }

    /// Look up every distinct name once, in first-seen order. Repeats are
    /// dropped so a batch never targets the same entry twice.
    fn classify(&self, cursor: &NavigationCursor, names: &[String]) -> Result<Vec<Entry>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let entry = self.entry(cursor, name)?;
            if seen.insert(entry.name.clone()) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn walk_plan(root: &Dir, rel: &Path, plan: &mut Vec<PlannedRemoval>) -> Result<()> {
    let dir = root.open_dir(rel).map_err(|e| DocspaceError::io(rel, e))?;
    for item in dir.entries().map_err(|e| DocspaceError::io(rel, e))? {
        let item = item.map_err(|e| DocspaceError::io(rel, e))?;
        let child = rel.join(item.file_name());
        let file_type = item.file_type().map_err(|e| DocspaceError::io(&child, e))?;
        let kind = EntryKind::of(&file_type);
        if kind == EntryKind::Directory {
            walk_plan(root, &child, plan)?;
        }
        plan.push(PlannedRemoval { path: child, kind });
    }
    Ok(())
}

/// Depth-first removal. Symlinks are unlinked, never followed.
fn remove_tree(root: &Dir, rel: &Path) -> Result<usize> {
    let mut removed = 0;
    let dir = root.open_dir(rel).map_err(|e| DocspaceError::io(rel, e))?;

    for item in dir.entries().map_err(|e| DocspaceError::io(rel, e))? {
        let item = item.map_err(|e| DocspaceError::io(rel, e))?;
        let child = rel.join(item.file_name());
        let file_type = item.file_type().map_err(|e| DocspaceError::io(&child, e))?;
        if EntryKind::of(&file_type) == EntryKind::Directory {
            removed += remove_tree(root, &child)?;
        } else {
            root.remove_file(&child)
                .map_err(|e| DocspaceError::io(&child, e))?;
            removed += 1;
        }
    }

    root.remove_dir(rel).map_err(|e| DocspaceError::io(rel, e))?;
    Ok(removed + 1)
}
