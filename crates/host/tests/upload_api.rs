mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::harness::fields;
use serde_json::{json, Value};
use syncnote_host::api::{app, AppState};
use syncnote_protocol::DocumentPath;
use syncnote_store::{DocumentStore, MemoryStore, MemoryUploads};
use tower::ServiceExt;

const BOUNDARY: &str = "syncnote-test-boundary";

fn state(uploads: &Arc<MemoryUploads>, store: &MemoryStore, max_file_size: u64) -> AppState {
    AppState {
        uploads: uploads.clone(),
        store: Arc::new(store.clone()),
        max_file_size,
    }
}

fn multipart(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let uploads = Arc::new(MemoryUploads::default());
    let response = app(state(&uploads, &MemoryStore::new(), 1024))
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], json!("ok"));
}

#[tokio::test]
async fn upload_returns_secure_url() {
    let uploads = Arc::new(MemoryUploads::default());
    let response = app(state(&uploads, &MemoryStore::new(), 1024))
        .oneshot(multipart("file", "cat.png", "image/png", b"not really a png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let url = body["secure_url"].as_str().unwrap();
    assert!(url.contains("/image/upload/v"));
    assert_eq!(uploads.hosted_count(), 1);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let uploads = Arc::new(MemoryUploads::default());
    let response = app(state(&uploads, &MemoryStore::new(), 1024))
        .oneshot(multipart("attachment", "cat.png", "image/png", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "message": "No file provided" }));
    assert_eq!(uploads.hosted_count(), 0);
}

#[tokio::test]
async fn upload_failure_is_a_server_error() {
    let uploads = Arc::new(MemoryUploads::default());
    uploads.reject_uploads(Some("quota exceeded".into()));
    let response = app(state(&uploads, &MemoryStore::new(), 1024))
        .oneshot(multipart("file", "cat.png", "image/png", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["message"], json!("Error uploading image"));
    assert_eq!(body["error"], json!("upload rejected: quota exceeded"));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let uploads = Arc::new(MemoryUploads::default());
    let response = app(state(&uploads, &MemoryStore::new(), 8))
        .oneshot(multipart("file", "big.png", "image/png", &[0u8; 64]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(uploads.hosted_count(), 0);
}

#[tokio::test]
async fn upload_route_only_accepts_post() {
    let uploads = Arc::new(MemoryUploads::default());
    let response = app(state(&uploads, &MemoryStore::new(), 1024))
        .oneshot(Request::get("/api/upload").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn delete_forwards_public_id() {
    let uploads = Arc::new(MemoryUploads::default());
    let router = app(state(&uploads, &MemoryStore::new(), 1024));

    let uploaded = router
        .clone()
        .oneshot(multipart("file", "cat.png", "image/png", b"data"))
        .await
        .unwrap();
    let url = json_body(uploaded).await["secure_url"].as_str().unwrap().to_string();
    let public_id = syncnote_host::external_id(&url).unwrap();

    let delete = |id: &str| {
        Request::post("/api/delete")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "publicId": id }).to_string()))
            .unwrap()
    };

    let response = router.clone().oneshot(delete(&public_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(uploads.hosted_count(), 0);

    let response = router.oneshot(delete(&public_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn documents_are_readable() {
    let uploads = Arc::new(MemoryUploads::default());
    let store = MemoryStore::new();
    store
        .set_merge(&DocumentPath::new("texts/u1-notes"), fields(json!({ "content": "hello" })))
        .await
        .unwrap();
    let router = app(state(&uploads, &store, 1024));

    let response = router
        .clone()
        .oneshot(Request::get("/api/documents/texts/u1-notes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "content": "hello" }));

    let response = router
        .oneshot(Request::get("/api/documents/texts/u2-notes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn browser_client_route_names_are_served() {
    let uploads = Arc::new(MemoryUploads::default());
    let router = app(state(&uploads, &MemoryStore::new(), 1024));

    let mut upload = multipart("file", "cat.png", "image/png", b"data");
    *upload.uri_mut() = "/api/uploadImage".parse().unwrap();
    let response = router.clone().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let url = json_body(response).await["secure_url"].as_str().unwrap().to_string();
    assert_eq!(uploads.hosted_count(), 1);

    let response = router
        .oneshot(
            Request::post("/api/deleteImage")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "publicId": syncnote_host::external_id(&url).unwrap() }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(uploads.hosted_count(), 0);
}
