//! Serving a single file out of a tree.

use std::fs::File;
use std::io::Read;

use tracing::debug;

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};
use crate::segment::PathSegment;
use crate::tree::WorkspaceTree;

/// Media type for extensions missing from [`CONTENT_TYPES`].
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to media type. Extensions are compared lower-cased.
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("exe", "application/octet-stream"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    ("xls", "application/vnd.ms-excel"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Media type for a file name, by extension.
pub fn content_type_for(name: &PathSegment) -> &'static str {
    name.extension()
        .and_then(|ext| {
            CONTENT_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, media)| *media)
        })
        .unwrap_or(OCTET_STREAM)
}

/// A file ready to be sent as an attachment.
#[derive(Debug)]
pub struct Download {
    /// Leaf name, used for the attachment file name.
    pub file_name: PathSegment,
    /// Media type from the extension table.
    pub content_type: &'static str,
    /// Exact length in bytes.
    pub length: u64,
    /// Open handle positioned at the start.
    pub file: File,
}

impl Download {
    /// `Content-Disposition` value naming only the leaf.
    ///
    /// Segments never contain control characters; quotes are replaced so the
    /// header value stays a single quoted-string.
    pub fn content_disposition(&self) -> String {
        let safe: String = self
            .file_name
            .as_str()
            .chars()
            .map(|c| if c == '"' { '\'' } else { c })
            .collect();
        format!("attachment; filename=\"{safe}\"")
    }

    /// Read the whole file into memory, at most `length` bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.length as usize);
        self.file
            .take(self.length)
            .read_to_end(&mut bytes)
            .map_err(|e| DocspaceError::io(self.file_name.as_str(), e))?;
        Ok(bytes)
    }
}

/// Open `requested_name` in the cursor directory for download.
pub fn respond(
    tree: &WorkspaceTree,
    cursor: &NavigationCursor,
    requested_name: &str,
) -> Result<Download> {
    let file_name = PathSegment::parse(requested_name)?;
    let rel = cursor.join(&file_name);

    let dir = tree.cursor_dir(cursor)?;
    let file = dir
        .open(&file_name)
        .map_err(|e| DocspaceError::io(&rel, e))?;
    let metadata = file.metadata().map_err(|e| DocspaceError::io(&rel, e))?;
    if metadata.is_dir() {
        return Err(DocspaceError::IsDirectory { path: rel });
    }

    let content_type = content_type_for(&file_name);
    debug!(tree = %tree.kind(), path = %rel.display(), content_type, "serving download");

    Ok(Download {
        file_name,
        content_type,
        length: metadata.len(),
        file: file.into_std(),
    })
}
