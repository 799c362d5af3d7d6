use std::io::Cursor;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use docspace::{
    DocspaceError, Entry, NavigationCursor, SessionContext, TreeKind, UploadedPayload, Workspace,
    ARCHIVE_FILE_NAME, SVG_CONTENT_TYPE,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::auth::{self, AuthConfig, Caller};
use crate::command::{required, required_list, WorkspaceCommand};
use crate::error::ApiError;
use crate::sessions::SessionStore;

pub const WORKSPACE_PATH: &str = "/v1/workspace";
const UPLOAD_FIELD: &str = "userfile";

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Workspace>,
    pub sessions: Arc<SessionStore>,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Serialize)]
struct TreeView {
    cursor: NavigationCursor,
    entries: Vec<Entry>,
}

#[derive(Debug, Serialize)]
struct WorkspaceView {
    user_id: i64,
    level: u32,
    received: TreeView,
    generated: TreeView,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let guarded = Router::new()
        .route(WORKSPACE_PATH, get(workspace_view))
        .route("/v1/workspace/commands", post(run_command))
        .route("/v1/workspace/upload", post(upload_file))
        .route("/v1/visualize", post(visualize))
        .route_layer(middleware::from_fn_with_state(state.clone(), principal_middleware));

    Router::new()
        .route("/v1/health", get(health))
        .merge(guarded)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Resolve the caller from principal headers. Anonymous or under-privileged
/// callers are sent to the landing page without running anything.
async fn principal_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(caller) = auth::read_caller(request.headers())? else {
        return Ok(Redirect::to("/").into_response());
    };
    if let Some(auth) = state.auth.as_ref() {
        auth::verify_caller(request.headers(), &caller, auth)?;
    }
    if !caller.principal.can_use_workspace() {
        debug!(user = caller.principal.user_id, level = caller.principal.level, "access level too low");
        return Ok(Redirect::to("/").into_response());
    }

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn workspace_view(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<WorkspaceView>, ApiError> {
    let mut ctx = state.sessions.checkout(&caller);
    for kind in [TreeKind::Received, TreeKind::Generated] {
        if state.workspace.repair_cursor(&mut ctx, kind)? {
            info!(session = %caller.session, tree = %kind, "cursor directory vanished; reset to root");
        }
    }

    let view = WorkspaceView {
        user_id: ctx.principal.user_id,
        level: ctx.principal.level,
        received: TreeView {
            cursor: ctx.received.clone(),
            entries: state.workspace.list(&ctx, TreeKind::Received)?,
        },
        generated: TreeView {
            cursor: ctx.generated.clone(),
            entries: state.workspace.list(&ctx, TreeKind::Generated)?,
        },
    };
    state.sessions.store(&caller.session, ctx);
    Ok(Json(view))
}

async fn run_command(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let command = WorkspaceCommand::from_json(&body)?;
    let mut ctx = state.sessions.checkout(&caller);
    let workspace = &state.workspace;
    debug!(session = %caller.session, mutating = command.is_mutating(), ?command, "dispatching command");

    let response = match command {
        WorkspaceCommand::Chdir { tree, dir } => {
            workspace.chdir(&mut ctx, tree, required("dir", &dir)?)?;
            None
        }
        WorkspaceCommand::Updir { tree } => {
            workspace.updir(&mut ctx, tree);
            None
        }
        WorkspaceCommand::CreateDirectory { tree, dir } => {
            workspace.create_directory(&ctx, tree, required("dir", &dir)?)?;
            None
        }
        WorkspaceCommand::DeleteSelected { tree, names } => {
            let outcome = workspace.delete_selected(&ctx, tree, required_list("names", &names)?)?;
            info!(tree = %tree, removed = outcome.removed.len(), skipped = outcome.skipped.len(), "deleted files");
            None
        }
        WorkspaceCommand::RemoveDirectory { tree, names } => {
            let outcome = workspace.remove_directories(&ctx, tree, required_list("names", &names)?)?;
            info!(
                tree = %tree,
                removed = outcome.removed.len(),
                entries = outcome.entries_removed,
                "removed directories"
            );
            None
        }
        WorkspaceCommand::GenerateReport { files } => {
            let workspace = state.workspace.clone();
            let job_ctx = ctx.clone();
            blocking(move || workspace.generate_report(&job_ctx, &files)).await?;
            None
        }
        WorkspaceCommand::Download { tree, file } => {
            let download = workspace.download(&ctx, tree, required("file", &file)?)?;
            let headers = attachment_headers(
                download.content_type,
                &download.content_disposition(),
                download.length,
            )?;
            // Stream at most the length announced in the headers.
            let file = tokio::fs::File::from_std(download.file).take(download.length);
            let body = Body::from_stream(ReaderStream::new(file));
            Some((StatusCode::OK, headers, body).into_response())
        }
        WorkspaceCommand::DownloadReportArchive => {
            let workspace = state.workspace.clone();
            let job_ctx = ctx.clone();
            let bytes = blocking(move || workspace.build_archive(&job_ctx)).await?;
            let disposition = format!("attachment; filename=\"{ARCHIVE_FILE_NAME}\"");
            Some(attachment("application/zip", &disposition, bytes)?)
        }
    };

    state.sessions.store(&caller.session, ctx);
    Ok(response.unwrap_or_else(|| Redirect::to(WORKSPACE_PATH).into_response()))
}

async fn upload_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let ctx = state.sessions.checkout(&caller);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Body(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let declared_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Body(e.to_string()))?;

        let workspace = state.workspace.clone();
        let size = bytes.len() as u64;
        blocking(move || {
            let payload = UploadedPayload::new(declared_name, Cursor::new(bytes)).with_size(size);
            workspace.upload(&ctx, payload)
        })
        .await?;
        return Ok(Redirect::to(WORKSPACE_PATH).into_response());
    }

    Err(DocspaceError::MissingParameter {
        name: UPLOAD_FIELD.into(),
    }
    .into())
}

async fn visualize(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(DocspaceError::MissingParameter { name: "data".into() }.into());
    }
    let workspace = state.workspace.clone();
    let svg = blocking(move || workspace.render(&body)).await?;
    Ok(([(header::CONTENT_TYPE, SVG_CONTENT_TYPE)], svg).into_response())
}

/// Run blocking filesystem or process work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> docspace::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?
        .map_err(ApiError::from)
}

fn attachment(content_type: &str, disposition: &str, bytes: Vec<u8>) -> Result<Response, ApiError> {
    let headers = attachment_headers(content_type, disposition, bytes.len() as u64)?;
    Ok((StatusCode::OK, headers, bytes).into_response())
}

fn attachment_headers(content_type: &str, disposition: &str, length: u64) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(content_type)?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONTENT_DISPOSITION, header_value(disposition)?);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("must-revalidate"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("public"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Worker(format!("bad header value: {e}")))
}
