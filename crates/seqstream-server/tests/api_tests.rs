//! HTTP surface tests for the SeqStream server

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use seqstream_core::{ClusterAssignment, ProviderError, SequenceSet, SessionId};
use seqstream_pipeline::{
    ClassificationProvider, DisabledVerifier, Orchestrator, SessionRegistry, VerificationStreamer,
};
use seqstream_server::{create_router, AppState, UploadResponse};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "seqstream-test-boundary";

struct SingleGroup;

#[async_trait]
impl ClassificationProvider for SingleGroup {
    async fn classify(&self, sequences: &SequenceSet) -> Result<ClusterAssignment, ProviderError> {
        Ok(ClusterAssignment::new(vec![0; sequences.len()]))
    }

    fn name(&self) -> &str {
        "single-group"
    }
}

fn app(dir: &TempDir) -> (Router, Arc<SessionRegistry>) {
    let registry = Arc::new(SessionRegistry::new(dir.path()));
    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        Arc::new(SingleGroup),
        VerificationStreamer::new(Arc::new(DisabledVerifier)),
    );
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let state = AppState::from_parts(orchestrator, handle, Duration::ZERO);
    (create_router(state, 1024 * 1024), registry)
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_stores_file_under_session_id() {
    let dir = TempDir::new().unwrap();
    let (app, registry) = app(&dir);

    let response = app
        .oneshot(multipart(&[
            ("type", None, ".fasta"),
            ("file", Some("reads.fasta"), ">r1\nACGT\n>r2\nGGCC\n"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: UploadResponse = serde_json::from_value(json_body(response).await).unwrap();
    let id: SessionId = body.file_id.parse().unwrap();

    let stored = dir.path().join(format!("{}.fasta", id));
    assert_eq!(std::fs::read(&stored).unwrap(), b">r1\nACGT\n>r2\nGGCC\n");
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_upload_defaults_to_fastq() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(multipart(&[("file", Some("reads.fq"), "@r1\nACGT\n+\nIIII\n")]))
        .await
        .unwrap();

    let body: UploadResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert!(dir.path().join(format!("{}.fastq", body.file_id)).exists());
}

#[tokio::test]
async fn test_upload_rejects_unknown_type() {
    let dir = TempDir::new().unwrap();
    let (app, registry) = app(&dir);

    let response = app
        .oneshot(multipart(&[
            ("type", None, "bam"),
            ("file", Some("reads.bam"), "\x00\x01"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported format"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(multipart(&[("type", None, "fastq")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app(&dir);

    let response = app
        .oneshot(Request::get("/v1/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
