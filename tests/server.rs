//! HTTP boundary tests: the axum router driven in-process with
//! `tower::ServiceExt::oneshot` and a scripted model client.
//!
//! Run with:
//!   cargo test --test server

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use cma_report::pipeline::docx::DOCX_MIME;
use cma_report::pipeline::encode::{Attachment, AttachmentKind};
use cma_report::{
    create_router, AnalysisConfig, CmaError, Completion, ModelClient, ServiceConfig,
    SERVER_KEY_SENTINEL,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const ROUTE: &str = "/api/generate-cma";
const BOUNDARY: &str = "----cma-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Model client that replays one reply and records what it was sent.
struct Scripted {
    reply: String,
    calls: AtomicUsize,
    seen: Mutex<Option<(String, Vec<(String, AttachmentKind)>)>>,
}

impl Scripted {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<Completion, CmaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let files = attachments
            .iter()
            .map(|a| (a.file_name.clone(), a.kind))
            .collect();
        *self.seen.lock().unwrap() = Some((prompt.to_string(), files));
        Ok(Completion {
            text: self.reply.clone(),
            ..Completion::default()
        })
    }
}

fn app(client: Arc<Scripted>, server_key: Option<&str>) -> Router {
    app_with(client, server_key, |b| b)
}

fn app_with(
    client: Arc<Scripted>,
    server_key: Option<&str>,
    tune: impl FnOnce(cma_report::ServiceConfigBuilder) -> cma_report::ServiceConfigBuilder,
) -> Router {
    let analysis = AnalysisConfig::builder().client(client).build().unwrap();
    let mut builder = ServiceConfig::builder().analysis(analysis);
    if let Some(key) = server_key {
        builder = builder.server_api_key(key);
    }
    create_router(tune(builder).build().unwrap())
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(parts: &[Part<'_>]) -> Body {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn post(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(ROUTE)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart(parts))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n";
const REPLY: &str = "```json\n{\"propertyAddress\":\"12 Oak St\",\"pricePerSF\":195}\n```";

// ── CORS and methods ─────────────────────────────────────────────────────────

#[tokio::test]
async fn options_is_ok() {
    let response = app(Scripted::new(REPLY), None)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(ROUTE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn preflight_allows_any_origin() {
    let response = app(Scripted::new(REPLY), None)
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(ROUTE)
                .header(header::ORIGIN, "https://agent.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("POST"));
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let client = Scripted::new(REPLY);
    let response = app(client.clone(), None)
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(ROUTE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json_body(response).await, json!({ "error": "Method not allowed" }));
    assert_eq!(client.calls(), 0);
}

// ── Request validation ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_api_key_is_rejected() {
    let client = Scripted::new(REPLY);
    let response = app(client.clone(), Some("sk-ant-server"))
        .oneshot(post(&[Part::File("mls.pdf", "application/pdf", PDF)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "API key required" }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn sentinel_without_server_key_is_rejected() {
    let response = app(Scripted::new(REPLY), None)
        .oneshot(post(&[
            Part::File("mls.pdf", "application/pdf", PDF),
            Part::Text("apiKey", SERVER_KEY_SENTINEL),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "API key required" }));
}

#[tokio::test]
async fn zero_files_never_reach_the_model() {
    let client = Scripted::new(REPLY);
    let response = app(client.clone(), None)
        .oneshot(post(&[
            Part::Text("apiKey", "sk-ant-caller"),
            Part::Text("notes", "corner lot"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "No files uploaded" }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn credential_is_checked_before_files() {
    let response = app(Scripted::new(REPLY), None)
        .oneshot(post(&[Part::Text("notes", "nothing else")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "error": "API key required" }));
}

#[tokio::test]
async fn oversized_file_is_413() {
    let client = Scripted::new(REPLY);
    let response = app_with(client.clone(), None, |b| b.max_file_bytes(16))
        .oneshot(post(&[
            Part::Text("apiKey", "sk-ant-caller"),
            Part::File("big.pdf", "application/pdf", &[b'x'; 64]),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("big.pdf"));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn non_multipart_body_is_a_bad_request() {
    let response = app(Scripted::new(REPLY), None)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(ROUTE)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"apiKey":"sk"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

// ── Success and upstream failure ─────────────────────────────────────────────

#[tokio::test]
async fn success_returns_a_docx_attachment() {
    let client = Scripted::new(REPLY);
    let response = app(client.clone(), Some("sk-ant-server"))
        .oneshot(post(&[
            Part::File("mls.pdf", "application/pdf", PDF),
            Part::File("photo.png", "image/png", b"\x89PNG\r\n\x1a\n0000"),
            Part::Text("notes", "New roof 2023"),
            Part::Text("apiKey", SERVER_KEY_SENTINEL),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], DOCX_MIME);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=CMA_Report.docx"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..2], b"PK");

    assert_eq!(client.calls(), 1);
    let (prompt, files) = client.seen.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("2 files"));
    assert!(prompt.contains("New roof 2023"));
    assert_eq!(
        files,
        vec![
            ("mls.pdf".to_string(), AttachmentKind::Pdf),
            ("photo.png".to_string(), AttachmentKind::Image),
        ]
    );
}

#[tokio::test]
async fn malformed_reply_is_a_server_error() {
    let client = Scripted::new("Sorry, I cannot help with that.");
    let response = app(client.clone(), None)
        .oneshot(post(&[
            Part::Text("apiKey", "sk-ant-caller"),
            Part::File("mls.pdf", "application/pdf", PDF),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Failed to generate CMA");
    assert!(!body["details"].as_str().unwrap().is_empty());
    assert_eq!(client.calls(), 1);
}
