//! HTTP boundary: one multipart endpoint that answers with a `.docx`.
//!
//! ```text
//! POST {route}   multipart: files (1..n), notes?, apiKey
//!   200  application/vnd…document   Content-Disposition: attachment; filename=CMA_Report.docx
//!   400  {"error": "..."}           missing key, no files, undecodable form
//!   405  {"error": "Method not allowed"}
//!   413  {"error": "..."}           file or file count over the ceiling
//!   500  {"error": "Failed to generate CMA", "details": "..."}
//! OPTIONS {route} → 200, permissive CORS
//! ```
//!
//! Upload ceilings are enforced while the body streams in, so an oversized
//! file is never buffered whole. After the form is read the credential is
//! resolved first and the file list is checked second; both happen before
//! any model call.

use crate::analyze::{generate_report, resolve_client};
use crate::config::ServiceConfig;
use crate::credential::resolve_credential;
use crate::error::{CmaError, ErrorKind};
use crate::pipeline::docx::DOCX_MIME;
use crate::pipeline::input::{self, UploadedFile};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

/// `Content-Disposition` of every successful response.
pub const REPORT_DISPOSITION: &str = "attachment; filename=CMA_Report.docx";

/// Error message for every upstream or internal failure.
pub const GENERATE_FAILED: &str = "Failed to generate CMA";

/// State shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn create_router(config: ServiceConfig) -> Router {
    let body_limit = config.body_limit();
    let route = config.route.clone();
    let state = AppState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            &route,
            post(generate_cma)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn run_server(config: ServiceConfig, addr: SocketAddr) -> std::io::Result<()> {
    let route = config.route.clone();
    info!(
        "Server key {}; per-file limit {} bytes, at most {} files",
        if config.server_api_key.is_some() {
            "configured"
        } else {
            "not configured"
        },
        config.max_file_bytes,
        config.max_files
    );
    let app = create_router(config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("CMA service listening on http://{}{}", listener.local_addr()?, route);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> CmaError {
    CmaError::MethodNotAllowed
}

async fn generate_cma(
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Response, CmaError> {
    let config = &state.config;
    let multipart = form.map_err(|e| CmaError::InvalidForm(e.body_text()))?;

    // ── Step 1: Read the form, enforcing upload ceilings ─────────────────
    let form = read_form(multipart, config).await?;

    // ── Step 2: Credential, then files ───────────────────────────────────
    let credential = resolve_credential(form.api_key.as_deref(), config.server_api_key.as_deref())?;
    info!("Using {} API key", credential.source);
    input::validate_uploads(&form.files, config.max_file_bytes, config.max_files)?;

    // ── Step 3: Analyse and render ───────────────────────────────────────
    let client = resolve_client(&credential, &config.analysis)?;
    let report = generate_report(
        client.as_ref(),
        &form.files,
        form.notes.as_deref(),
        &config.analysis,
    )
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_MIME)),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static(REPORT_DISPOSITION),
            ),
        ],
        report.bytes,
    )
        .into_response())
}

// ── Form decoding ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CmaForm {
    files: Vec<UploadedFile>,
    notes: Option<String>,
    api_key: Option<String>,
}

async fn read_form(mut multipart: Multipart, config: &ServiceConfig) -> Result<CmaForm, CmaError> {
    let mut form = CmaForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let file_name = field.file_name().map(str::to_string);
                let declared = field.content_type().map(str::to_string);
                let label = file_name
                    .clone()
                    .unwrap_or_else(|| format!("upload-{}", form.files.len() + 1));

                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(form_error)? {
                    let size = bytes.len() + chunk.len();
                    if size > config.max_file_bytes {
                        return Err(CmaError::FileTooLarge {
                            name: label,
                            size,
                            limit: config.max_file_bytes,
                        });
                    }
                    bytes.extend_from_slice(&chunk);
                }

                // An empty file input still submits one nameless, empty part.
                if bytes.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
                    debug!("Skipping empty file part");
                    continue;
                }

                if form.files.len() == config.max_files {
                    return Err(CmaError::TooManyFiles {
                        count: form.files.len() + 1,
                        limit: config.max_files,
                    });
                }

                let index = form.files.len();
                form.files.push(UploadedFile::new(
                    file_name.as_deref(),
                    declared.as_deref(),
                    bytes,
                    index,
                ));
            }
            "notes" => form.notes = Some(field.text().await.map_err(form_error)?),
            "apiKey" => form.api_key = Some(field.text().await.map_err(form_error)?),
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    debug!(
        "Form: {} file(s), notes {}, apiKey {}",
        form.files.len(),
        if form.notes.is_some() { "present" } else { "absent" },
        if form.api_key.is_some() { "present" } else { "absent" },
    );
    Ok(form)
}

fn form_error(e: MultipartError) -> CmaError {
    CmaError::InvalidForm(e.body_text())
}

// ── Error responses ──────────────────────────────────────────────────────

impl IntoResponse for CmaError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::InvalidRequest => {
                let status = match &self {
                    CmaError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
                    CmaError::FileTooLarge { .. } | CmaError::TooManyFiles { .. } => {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                warn!("Rejected request ({}): {}", status.as_u16(), self);
                (status, Json(json!({ "error": self.to_string() }))).into_response()
            }
            ErrorKind::UpstreamFailure | ErrorKind::Internal => {
                error!("CMA generation failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": GENERATE_FAILED, "details": self.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
