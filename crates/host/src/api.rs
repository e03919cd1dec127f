//! REST API server for syncnote
//!
//! Upload proxy in front of the media host, plus read-only document access.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use syncnote_protocol::DocumentPath;
use syncnote_store::{DocumentStore, UploadConstraints, UploadError, UploadFile, UploadService};

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<dyn UploadService>,
    pub store: Arc<dyn DocumentStore>,
    pub max_file_size: u64,
}

// Delete request, as the browser client sends it
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "publicId")]
    pub public_id: String,
}

// Routes
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload_file))
        .route("/delete", post(delete_file))
        // Route names used by the browser client
        .route("/uploadImage", post(upload_file))
        .route("/deleteImage", post(delete_file))
        .route("/documents/*path", get(get_document))
}

/// Full application: `/api` routes with the upload body limit applied
pub fn app(state: AppState) -> Router {
    let limit = usize::try_from(state.max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);
    Router::new()
        .nest("/api", api_router())
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

// Handlers

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    let file = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "No file provided" })),
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed upload");
            return (
                e.status(),
                Json(json!({ "message": "Error uploading image", "error": e.body_text() })),
            );
        }
    };

    let name = file.name.clone();
    match state
        .uploads
        .upload(file, &UploadConstraints::any(state.max_file_size))
        .await
    {
        Ok(uploaded) => {
            tracing::info!(file = %name, url = %uploaded.url, "upload proxied");
            (StatusCode::OK, Json(json!({ "secure_url": uploaded.url })))
        }
        Err(e) => {
            tracing::error!(file = %name, error = %e, "upload failed");
            let status = match e {
                UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({ "message": "Error uploading image", "error": e.to_string() })),
            )
        }
    }
}

/// First `file` field of the form, if any
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        let file = UploadFile::new(name, data);
        return Ok(Some(match content_type {
            Some(content_type) => file.with_content_type(content_type),
            None => file,
        }));
    }
    Ok(None)
}

async fn delete_file(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> impl IntoResponse {
    match state.uploads.delete(&req.public_id).await {
        Ok(()) => {
            tracing::info!(public_id = %req.public_id, "hosted file deleted");
            (StatusCode::OK, Json(json!({ "result": "ok" })))
        }
        Err(UploadError::NotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Image not found", "publicId": id })),
        ),
        Err(e) => {
            tracing::error!(public_id = %req.public_id, error = %e, "delete failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Error deleting image", "error": e.to_string() })),
            )
        }
    }
}

async fn get_document(State(state): State<AppState>, Path(path): Path<String>) -> impl IntoResponse {
    let path = DocumentPath::new(&path);
    match state.store.get(&path).await {
        Ok(Some(doc)) => (StatusCode::OK, Json(Value::Object(doc))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Document not found", "path": path })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Error loading document", "error": e.to_string() })),
        ),
    }
}
