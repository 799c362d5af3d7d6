//! Packing the generated cursor directory into one zip archive.
//!
//! Only regular files directly in the cursor directory are packed, under
//! their own names. Access-control files are never included. The archive is
//! built in memory.

use std::io::{self, Cursor};
use std::path::PathBuf;

use tracing::info;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};
use crate::tree::WorkspaceTree;

/// File name used for the archive in responses.
pub const ARCHIVE_FILE_NAME: &str = "report.zip";

/// Names excluded from every archive.
pub const CONTROL_FILES: [&str; 2] = [".htaccess", ".htpasswd"];

/// One file to pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the tree root.
    pub source_path: PathBuf,
    /// Name inside the archive.
    pub archive_name: String,
}

/// List the files [`ArchiveBuilder::build`] would pack, sorted by name.
pub fn collect_entries(tree: &WorkspaceTree, cursor: &NavigationCursor) -> Result<Vec<ArchiveEntry>> {
    let base = cursor.relative_path();
    let mut entries: Vec<_> = tree
        .list(cursor)?
        .into_iter()
        .filter(|entry| entry.is_file())
        .filter(|entry| !CONTROL_FILES.contains(&entry.name.as_str()))
        .map(|entry| ArchiveEntry {
            source_path: base.join(&entry.name),
            archive_name: entry.name,
        })
        .collect();
    entries.sort_by(|a, b| a.archive_name.cmp(&b.archive_name));
    Ok(entries)
}

/// Builds zip archives of a tree directory.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveBuilder {
    compression: CompressionMethod,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
        }
    }
}

impl ArchiveBuilder {
    /// A deflate-compressing builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another compression method.
    ///
    /// Methods this build of the zip codec lacks fail at [`build`] time with
    /// [`DocspaceError::ArchiveUnavailable`].
    ///
    /// [`build`]: ArchiveBuilder::build
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Pack the cursor directory and return the archive bytes.
    pub fn build(&self, tree: &WorkspaceTree, cursor: &NavigationCursor) -> Result<Vec<u8>> {
        let entries = collect_entries(tree, cursor)?;
        let dir = tree.cursor_dir(cursor)?;

        let fixed_time = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).map_err(|e| {
            DocspaceError::ArchiveUnavailable {
                reason: e.to_string(),
            }
        })?;
        let options = SimpleFileOptions::default()
            .compression_method(self.compression)
            .last_modified_time(fixed_time);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            zip.start_file(entry.archive_name.as_str(), options)
                .map_err(|e| archive_error(&entry.source_path, e))?;
            let mut file = dir
                .open(&entry.archive_name)
                .map_err(|e| DocspaceError::io(&entry.source_path, e))?;
            io::copy(&mut file, &mut zip).map_err(|e| DocspaceError::io(&entry.source_path, e))?;
        }

        let bytes = zip
            .finish()
            .map_err(|e| archive_error(&cursor.relative_path(), e))?
            .into_inner();

        info!(
            owner = tree.owner_id(),
            tree = %tree.kind(),
            path = %cursor,
            files = entries.len(),
            bytes = bytes.len(),
            "built archive"
        );
        Ok(bytes)
    }
}

fn archive_error(path: &std::path::Path, err: ZipError) -> DocspaceError {
    match err {
        ZipError::Io(source) => DocspaceError::io(path, source),
        other => DocspaceError::ArchiveUnavailable {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeKind;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_archive_skips_control_files_and_subdirectories() {
        let tmp = tempdir().unwrap();
        let tree = WorkspaceTree::open(tmp.path(), 2, TreeKind::Generated).unwrap();
        let root = NavigationCursor::root();
        for name in [".htaccess", ".htpasswd", "b.svg", "a.pdf"] {
            std::fs::write(tree.root_path().join(name), name.as_bytes()).unwrap();
        }
        tree.create_directory(&root, "nested").unwrap();
        std::fs::write(tree.root_path().join("nested/deep.txt"), b"x").unwrap();

        let bytes = ArchiveBuilder::new().build(&tree, &root).unwrap();
        assert_eq!(names(bytes), vec!["a.pdf", "b.svg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_archive_skips_symlinks() {
        let tmp = tempdir().unwrap();
        let tree = WorkspaceTree::open(tmp.path(), 2, TreeKind::Generated).unwrap();
        let root = NavigationCursor::root();
        tree.create_directory(&root, "sub").unwrap();
        std::fs::write(tree.root_path().join("out.svg"), b"<svg/>").unwrap();
        std::os::unix::fs::symlink("sub", tree.root_path().join("latest")).unwrap();
        std::os::unix::fs::symlink("out.svg", tree.root_path().join("alias.svg")).unwrap();

        let bytes = ArchiveBuilder::new().build(&tree, &root).unwrap();
        assert_eq!(names(bytes), vec!["out.svg"]);
    }

    #[test]
    fn test_archive_contents_round_trip() {
        let tmp = tempdir().unwrap();
        let tree = WorkspaceTree::open(tmp.path(), 2, TreeKind::Generated).unwrap();
        let root = NavigationCursor::root();
        tree.create_directory(&root, "run").unwrap();
        std::fs::write(tree.root_path().join("run/out.xml"), b"<graph/>").unwrap();

        let mut cursor = NavigationCursor::root();
        cursor.descend(&tree, "run").unwrap();
        let bytes = ArchiveBuilder::new().build(&tree, &cursor).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name("out.xml").unwrap();
        let mut contents = String::new();
        io::Read::read_to_string(&mut file, &mut contents).unwrap();
        assert_eq!(contents, "<graph/>");
    }

    #[test]
    fn test_empty_directory_yields_empty_archive() {
        let tmp = tempdir().unwrap();
        let tree = WorkspaceTree::open(tmp.path(), 2, TreeKind::Generated).unwrap();
        let bytes = ArchiveBuilder::new().build(&tree, &NavigationCursor::root()).unwrap();
        assert!(names(bytes).is_empty());
    }

    #[test]
    fn test_unsupported_codec_is_reported() {
        let err = archive_error(
            std::path::Path::new("run"),
            ZipError::UnsupportedArchive("compression method not supported"),
        );
        assert!(matches!(err, DocspaceError::ArchiveUnavailable { .. }));
    }
}
