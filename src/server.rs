//! HTTP server: REST API, widget page and MCP endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/`, `/api`, `/health` | Health check |
//! | `POST` | `/api/upload` | Multipart upload (field `file`) |
//! | `POST` | `/api/analyze` | Generate suggestions: `{doc_id, query}` |
//! | `POST` | `/api/apply` | Apply suggestions: `{doc_id, suggestion_ids}` |
//! | `GET`  | `/api/download/{id}` | Modified document (result id or document id) |
//! | `DELETE` | `/api/documents/{id}` | Forget a document and remove its files |
//! | `GET`  | `/widget` | Editor widget page |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document 42 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unknown_suggestion` (400),
//! `not_found` (404), `stale_suggestion` (409), `payload_too_large` (413),
//! `unreadable_document` (422), `upstream_unavailable` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: the widget runs inside
//! a host page on another origin.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::context::AppContext;
use crate::docx::MIME_DOCX;
use crate::error::DocxError;
use crate::mcp::McpBridge;
use crate::models::{DocumentStats, Suggestion};

/// Multipart framing allowance on top of `storage.max_upload_bytes`.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = Arc::new(AppContext::from_config(config.clone())?);
    info!(
        uploads = %config.storage.uploads_dir.display(),
        model = ctx.uses_model(),
        "starting DocxAI server"
    );
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the full router around an existing context.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let body_limit = ctx.config().storage.max_upload_bytes + MULTIPART_OVERHEAD;

    let mcp_ctx = Arc::clone(&ctx);
    let mcp_service = StreamableHttpService::new(
        move || Ok(McpBridge::new(Arc::clone(&mcp_ctx))),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/api", get(handle_health))
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/apply", post(handle_apply))
        .route("/api/download/{id}", get(handle_download))
        .route("/api/documents/{id}", delete(handle_delete))
        .route("/widget", get(handle_widget))
        .nest_service("/mcp", mcp_service)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { ctx })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<DocxError> for AppError {
    fn from(err: DocxError) -> Self {
        let status = match &err {
            DocxError::InvalidRequest(_) | DocxError::UnknownSuggestion(_) => {
                StatusCode::BAD_REQUEST
            }
            DocxError::NotFound(_) => StatusCode::NOT_FOUND,
            DocxError::StaleSuggestion { .. } => StatusCode::CONFLICT,
            DocxError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DocxError::UnreadableDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DocxError::UpstreamUnavailable(_) | DocxError::MalformedModelResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            DocxError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
            "internal error".to_string()
        } else {
            err.to_string()
        };
        AppError {
            status,
            code: err.code().to_string(),
            message,
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "payload_too_large".to_string(),
            message: err.body_text(),
        }
    } else {
        bad_request(err.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    version: &'static str,
    /// `model` when a completion API is configured, else `heuristic`.
    suggestions: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "DocxAI server is running",
        version: env!("CARGO_PKG_VERSION"),
        suggestions: if state.ctx.uses_model() {
            "model"
        } else {
            "heuristic"
        },
    })
}

// ============ POST /api/upload ============

#[derive(Serialize)]
struct UploadResponse {
    doc_id: String,
    filename: String,
    metadata: DocumentStats,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("document.docx").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        let doc = state.ctx.upload(&filename, bytes.to_vec()).await?;
        return Ok(Json(UploadResponse {
            doc_id: doc.id,
            filename: doc.filename,
            metadata: doc.stats,
        }));
    }
    Err(bad_request("multipart field `file` is required"))
}

// ============ POST /api/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    doc_id: String,
    #[serde(alias = "request")]
    query: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<Vec<Suggestion>>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let set = state.ctx.analyze(&req.doc_id, &req.query).await?;
    Ok(Json(set.suggestions.clone()))
}

// ============ POST /api/apply ============

#[derive(Deserialize)]
struct ApplyRequest {
    doc_id: String,
    #[serde(default)]
    suggestion_ids: Vec<String>,
}

#[derive(Serialize)]
struct ApplyResponse {
    download_url: String,
    result_id: String,
    applied_count: usize,
    applied_ids: Vec<String>,
    superseded_ids: Vec<String>,
}

async fn handle_apply(
    State(state): State<AppState>,
    body: Result<Json<ApplyRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<ApplyResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let result = state.ctx.apply(&req.doc_id, &req.suggestion_ids).await?;
    let base = state.ctx.public_url().await;
    Ok(Json(ApplyResponse {
        download_url: format!("{}/api/download/{}", base, result.id),
        result_id: result.id,
        applied_count: result.applied_ids.len(),
        applied_ids: result.applied_ids,
        superseded_ids: result.superseded_ids,
    }))
}

// ============ GET /api/download/{id} ============

async fn handle_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let result = state.ctx.download(&id)?;
    let bytes = match tokio::fs::read(&result.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DocxError::NotFound(format!("modified document {}", id)).into())
        }
        Err(e) => return Err(DocxError::Io(e).into()),
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe(&result.download_filename)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(MIME_DOCX)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Replaces characters that cannot appear in a quoted header parameter.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============ DELETE /api/documents/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.ctx.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ GET /widget ============

async fn handle_widget(State(state): State<AppState>) -> Html<String> {
    Html(state.ctx.widget_html().await)
}
