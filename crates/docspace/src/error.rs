//! Error types for workspace operations.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type for docspace operations.
pub type Result<T> = std::result::Result<T, DocspaceError>;

/// Errors raised by workspace operations.
///
/// Validation failures (`InvalidPath`, `InvalidName`, `MissingParameter`,
/// `InvalidSelection`) are always detected before anything on disk changes.
#[derive(Error, Debug)]
pub enum DocspaceError {
    /// A path or path fragment failed validation.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The rejected input.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A directory name does not match the allowed alphabet.
    #[error("invalid name '{name}': use only letters, numbers, spaces, '-' or '_'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A required request parameter was absent or empty.
    #[error("missing parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// The target does not exist.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Path relative to the sandbox root.
        path: PathBuf,
    },

    /// The target already exists.
    #[error("already exists: {}", path.display())]
    AlreadyExists {
        /// Path relative to the sandbox root.
        path: PathBuf,
    },

    /// A file operation was aimed at a directory.
    #[error("is a directory: {}", path.display())]
    IsDirectory {
        /// Path relative to the sandbox root.
        path: PathBuf,
    },

    /// The report input selection is unusable.
    #[error("invalid selection: {reason}")]
    InvalidSelection {
        /// Why the selection was rejected.
        reason: String,
    },

    /// A resolved path lands outside the sandbox root.
    #[error("sandbox escape: '{}' resolves outside the sandbox root", path.display())]
    SandboxEscape {
        /// The offending path.
        path: PathBuf,
    },

    /// The device ran out of space.
    #[error("no space left while writing {}", path.display())]
    StorageFull {
        /// Path being written.
        path: PathBuf,
    },

    /// Any other I/O failure, with the path it happened on.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The external executable does not exist.
    #[error("tool not found: {tool}")]
    ToolNotFound {
        /// Tool name or path.
        tool: String,
    },

    /// The external executable exited unsuccessfully.
    #[error("tool '{tool}' exited with {}", display_code(*code))]
    NonZeroExit {
        /// Tool name.
        tool: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// The external executable ran past its deadline and was killed.
    #[error("tool '{tool}' timed out after {after:?}")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Configured limit.
        after: Duration,
    },

    /// The archive could not be produced.
    #[error("archive unavailable: {reason}")]
    ArchiveUnavailable {
        /// Why packaging failed.
        reason: String,
    },
}

impl DocspaceError {
    /// Whether the error was raised by input validation, before any mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DocspaceError::InvalidPath { .. }
                | DocspaceError::InvalidName { .. }
                | DocspaceError::MissingParameter { .. }
                | DocspaceError::InvalidSelection { .. }
        )
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DocspaceError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while operating on `path`.
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => DocspaceError::NotFound { path },
            io::ErrorKind::AlreadyExists => DocspaceError::AlreadyExists { path },
            io::ErrorKind::StorageFull => DocspaceError::StorageFull { path },
            _ => DocspaceError::Io { path, source },
        }
    }
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let err = DocspaceError::io("a/b", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, DocspaceError::NotFound { .. }));

        let err = DocspaceError::io("a", io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(err, DocspaceError::AlreadyExists { .. }));

        let err = DocspaceError::io("a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, DocspaceError::Io { .. }));
        assert!(err.to_string().contains("io error on a"));
    }

    #[test]
    fn validation_errors_are_flagged() {
        assert!(DocspaceError::invalid_path("..", "parent reference").is_validation());
        assert!(DocspaceError::InvalidSelection {
            reason: "empty".into()
        }
        .is_validation());
        assert!(!DocspaceError::NotFound {
            path: PathBuf::from("x")
        }
        .is_validation());
    }

    #[test]
    fn non_zero_exit_message_mentions_signal() {
        let err = DocspaceError::NonZeroExit {
            tool: "beagleviz".into(),
            code: None,
        };
        assert!(err.to_string().contains("signal"));
    }
}
