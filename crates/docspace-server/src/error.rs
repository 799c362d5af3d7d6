use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docspace::DocspaceError;
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Docspace(#[from] DocspaceError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("request body error: {0}")]
    Body(String),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Docspace(err) => match err {
                DocspaceError::InvalidPath { .. } => (StatusCode::BAD_REQUEST, "invalid_path"),
                DocspaceError::InvalidName { .. } => (StatusCode::BAD_REQUEST, "invalid_name"),
                DocspaceError::MissingParameter { .. } => {
                    (StatusCode::BAD_REQUEST, "missing_parameter")
                }
                DocspaceError::InvalidSelection { .. } => {
                    (StatusCode::BAD_REQUEST, "invalid_selection")
                }
                DocspaceError::IsDirectory { .. } => (StatusCode::BAD_REQUEST, "is_directory"),
                DocspaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                DocspaceError::AlreadyExists { .. } => (StatusCode::CONFLICT, "already_exists"),
                DocspaceError::SandboxEscape { .. } => (StatusCode::FORBIDDEN, "sandbox_escape"),
                DocspaceError::StorageFull { .. } => {
                    (StatusCode::INSUFFICIENT_STORAGE, "storage_full")
                }
                DocspaceError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
                DocspaceError::ToolNotFound { .. } => (StatusCode::BAD_GATEWAY, "tool_not_found"),
                DocspaceError::NonZeroExit { .. } => (StatusCode::BAD_GATEWAY, "non_zero_exit"),
                DocspaceError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                DocspaceError::ArchiveUnavailable { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "archive_unavailable")
                }
            },
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
            ApiError::UnknownCommand(_) => (StatusCode::BAD_REQUEST, "unknown_command"),
            ApiError::InvalidCommand(_) => (StatusCode::BAD_REQUEST, "invalid_command"),
            ApiError::Body(_) => (StatusCode::BAD_REQUEST, "body_error"),
            ApiError::Worker(_) => (StatusCode::INTERNAL_SERVER_ERROR, "worker_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!(kind, error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(DocspaceError::InvalidName { name: "a/b".into() }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(DocspaceError::SandboxEscape { path: PathBuf::from("/etc") }),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(DocspaceError::AlreadyExists { path: PathBuf::from("x") }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(DocspaceError::StorageFull { path: PathBuf::from("x") }),
                StatusCode::INSUFFICIENT_STORAGE,
            ),
            (
                ApiError::from(DocspaceError::NonZeroExit { tool: "beagleviz".into(), code: Some(1) }),
                StatusCode::BAD_GATEWAY,
            ),
            (ApiError::UnknownCommand("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Auth(AuthError::InvalidSignature), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
