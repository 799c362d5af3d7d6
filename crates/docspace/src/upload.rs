//! Receiving uploaded files into a tree.
//!
//! Bytes land in a hidden temp file next to the target and are renamed over
//! it only once fully written and synced. A failed upload never leaves a
//! truncated file under the declared name.

use std::io::{self, Read};
use std::path::PathBuf;

use cap_std::fs::OpenOptions;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};
use crate::segment::PathSegment;
use crate::tree::WorkspaceTree;

/// Prefix of in-flight upload files; such names are hidden and reserved.
pub(crate) const UPLOAD_TEMP_PREFIX: &str = ".upload-";

/// An incoming file, consumed once by [`receive`].
pub struct UploadedPayload<R> {
    /// Client-supplied file name; untrusted.
    pub declared_name: String,
    /// The file contents.
    pub source: R,
    /// Length announced by the client, checked after writing when present.
    pub size: Option<u64>,
}

impl<R: Read> UploadedPayload<R> {
    /// A payload with no announced length.
    pub fn new(declared_name: impl Into<String>, source: R) -> Self {
        Self {
            declared_name: declared_name.into(),
            source,
            size: None,
        }
    }

    /// Announce the expected length.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Store `payload` under its declared name in the cursor directory.
///
/// An existing file of the same name is replaced. Returns the absolute path
/// written.
pub fn receive<R: Read>(
    tree: &WorkspaceTree,
    cursor: &NavigationCursor,
    mut payload: UploadedPayload<R>,
) -> Result<PathBuf> {
    let name = PathSegment::parse(&payload.declared_name)?;
    if name.as_str().starts_with(UPLOAD_TEMP_PREFIX) {
        return Err(DocspaceError::invalid_path(
            name.as_str(),
            "reserved upload name",
        ));
    }

    let target = tree.resolve(cursor, name.as_str())?;
    if target.is_dir() {
        return Err(DocspaceError::IsDirectory {
            path: cursor.join(&name),
        });
    }

    let dir = tree.cursor_dir(cursor)?;
    let temp_name = format!("{UPLOAD_TEMP_PREFIX}{}.part", Uuid::new_v4().simple());
    let temp_rel = cursor.relative_path().join(&temp_name);

    let mut file = dir
        .open_with(&temp_name, OpenOptions::new().write(true).create_new(true))
        .map_err(|e| DocspaceError::io(&temp_rel, e))?;

    let written = io::copy(&mut payload.source, &mut file)
        .and_then(|written| file.sync_all().map(|()| written))
        .map_err(|e| DocspaceError::io(&temp_rel, e))
        .and_then(|written| match payload.size {
            Some(expected) if expected != written => Err(DocspaceError::Io {
                path: cursor.join(&name),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("expected {expected} bytes, received {written}"),
                ),
            }),
            _ => Ok(written),
        });
    drop(file);

    let written = match written {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = dir.remove_file(&temp_name) {
                warn!(path = %temp_rel.display(), error = %cleanup, "failed to remove upload temp file");
            }
            return Err(e);
        }
    };

    debug!(from = %temp_name, to = %name, "committing upload");
    if let Err(e) = dir.rename(&temp_name, &dir, &name) {
        let _ = dir.remove_file(&temp_name);
        return Err(DocspaceError::io(cursor.join(&name), e));
    }

    info!(
        owner = tree.owner_id(),
        tree = %tree.kind(),
        path = %cursor.join(&name).display(),
        bytes = written,
        "received upload"
    );
    Ok(target)
}
