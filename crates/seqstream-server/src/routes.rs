//! HTTP routes and handlers

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use seqstream_core::InputFormat;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::state::AppState;
use crate::websocket;

/// Format assumed when an upload does not name one
const DEFAULT_UPLOAD_TYPE: &str = "fastq";

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/upload", post(upload))
        .route("/ws/:file_id", get(websocket::websocket_handler))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Backend is running" }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub message: String,
}

/// Store an uploaded sequence file and hand back its session id
///
/// Multipart fields: `file` (required) and `type` (`fastq`, `.fasta`, `fa`, ...).
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<Vec<u8>> = None;
    let mut kind: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => file = Some(field.bytes().await?.to_vec()),
            Some("type") => kind = Some(field.text().await?),
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let bytes = file.ok_or_else(|| AppError::InvalidRequest("missing 'file' field".into()))?;
    let format: InputFormat = kind
        .as_deref()
        .unwrap_or(DEFAULT_UPLOAD_TYPE)
        .parse()
        .map_err(AppError::InvalidRequest)?;

    let id = state
        .registry()
        .store(&bytes, format)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    info!(session = %id, %format, bytes = bytes.len(), "upload received");

    Ok(Json(UploadResponse {
        file_id: id.to_string(),
        message: "File received. Connect to WebSocket.".to_string(),
    }))
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
enum AppError {
    InvalidRequest(String),
    InternalError(String),
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::InvalidRequest(err.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg, "invalid_request_error"),
            AppError::InternalError(msg) => {
                error!("upload failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "server_error")
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
