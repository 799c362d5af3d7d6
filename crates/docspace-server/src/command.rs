//! Typed workspace commands.

use docspace::TreeKind;
use serde::Deserialize;

use crate::error::ApiError;

/// Every command the workspace view can post, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WorkspaceCommand {
    Chdir {
        tree: TreeKind,
        #[serde(default)]
        dir: String,
    },
    Updir {
        tree: TreeKind,
    },
    Download {
        tree: TreeKind,
        #[serde(default)]
        file: String,
    },
    CreateDirectory {
        tree: TreeKind,
        #[serde(default, alias = "dirrec", alias = "dirgen")]
        dir: String,
    },
    DeleteSelected {
        tree: TreeKind,
        #[serde(default)]
        names: Vec<String>,
    },
    RemoveDirectory {
        tree: TreeKind,
        #[serde(default)]
        names: Vec<String>,
    },
    GenerateReport {
        #[serde(default)]
        files: Vec<String>,
    },
    DownloadReportArchive,
}

impl WorkspaceCommand {
    pub const ACTIONS: [&'static str; 8] = [
        "chdir",
        "updir",
        "download",
        "create-directory",
        "delete-selected",
        "remove-directory",
        "generate-report",
        "download-report-archive",
    ];

    /// Parse a JSON command, reporting unknown tags as such rather than as
    /// generic deserialization failures.
    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ApiError::InvalidCommand(e.to_string()))?;
        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or_else(|| docspace::DocspaceError::MissingParameter {
                name: "action".into(),
            })?;
        if !Self::ACTIONS.contains(&action) {
            return Err(ApiError::UnknownCommand(action.to_string()));
        }
        serde_json::from_value(value).map_err(|e| ApiError::InvalidCommand(e.to_string()))
    }

    /// Whether a successful run changes state and answers with a redirect.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            WorkspaceCommand::Download { .. } | WorkspaceCommand::DownloadReportArchive
        )
    }
}

/// A required string parameter, rejected when empty.
pub fn required<'a>(name: &str, value: &'a str) -> Result<&'a str, docspace::DocspaceError> {
    if value.is_empty() {
        return Err(docspace::DocspaceError::MissingParameter { name: name.into() });
    }
    Ok(value)
}

/// A required list parameter, rejected when empty.
pub fn required_list<'a>(
    name: &str,
    values: &'a [String],
) -> Result<&'a [String], docspace::DocspaceError> {
    if values.is_empty() {
        return Err(docspace::DocspaceError::MissingParameter { name: name.into() });
    }
    Ok(values)
}
