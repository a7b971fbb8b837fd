//! Error types for the cma-report library.
//!
//! A single fatal error type, [`CmaError`], covers every way a report request
//! can fail. There is no partial output: a request either yields a complete
//! `.docx` document or one of these errors.
//!
//! Callers at the HTTP boundary do not care about the individual variant so
//! much as about *who is at fault*. [`CmaError::kind`] folds the variants into
//! three [`ErrorKind`]s:
//!
//! * [`ErrorKind::InvalidRequest`] — the caller sent something unusable
//!   (no credential, no files, oversized upload, wrong method).
//! * [`ErrorKind::UpstreamFailure`] — the model call failed or returned text
//!   that is not a JSON object.
//! * [`ErrorKind::Internal`] — document assembly, configuration or I/O broke.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`CmaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    UpstreamFailure,
    Internal,
}

/// All fatal errors returned by the cma-report library.
#[derive(Debug, Error)]
pub enum CmaError {
    // ── Request errors ────────────────────────────────────────────────────
    /// No usable API key: missing, empty, or the server-key sentinel was sent
    /// but the server holds no key.
    #[error("API key required")]
    MissingCredential,

    /// The form carried no file parts under `files`.
    #[error("No files uploaded")]
    NoFiles,

    /// A single uploaded file exceeded the configured ceiling.
    #[error("File '{name}' is too large: {size} bytes exceeds the {limit}-byte limit")]
    FileTooLarge { name: String, size: usize, limit: usize },

    /// More file parts than the service accepts in one request.
    #[error("Too many files: {count} uploaded, at most {limit} accepted")]
    TooManyFiles { count: usize, limit: usize },

    /// A local input file could not be read (CLI `analyze`).
    #[error("Cannot read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP method other than POST / OPTIONS.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The multipart body could not be decoded.
    #[error("Invalid form data: {0}")]
    InvalidForm(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model reply, after fence stripping, is not a JSON object.
    #[error("Model response is not valid analysis JSON: {detail}")]
    MalformedResponse { detail: String },

    /// The model returned no text content at all.
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// The model API answered with a non-success status.
    #[error("LLM API error (HTTP {status}): {message}")]
    LlmApiError { status: u16, message: String },

    /// 401/403 from the model API. Not retried.
    #[error("Authentication rejected by the model API: {detail}")]
    AuthError { detail: String },

    /// HTTP 429 from the model API.
    #[error("Rate limit exceeded by the model API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// A single model call exceeded `api_timeout_secs`.
    #[error("Model call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// Connection-level failure talking to the model API.
    #[error("Could not reach the model API: {0}")]
    Transport(String),

    /// An edgequake-llm provider call failed.
    #[error("LLM provider error: {0}")]
    ProviderError(String),

    /// The configured provider could not be built (missing env key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Local errors ──────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// docx assembly or packaging failed.
    #[error("Failed to assemble report document: {0}")]
    RenderFailed(String),

    /// Could not create or write the output report file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CmaError {
    /// Which party the failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CmaError::MissingCredential
            | CmaError::NoFiles
            | CmaError::FileTooLarge { .. }
            | CmaError::TooManyFiles { .. }
            | CmaError::InputReadFailed { .. }
            | CmaError::MethodNotAllowed
            | CmaError::InvalidForm(_) => ErrorKind::InvalidRequest,

            CmaError::MalformedResponse { .. }
            | CmaError::EmptyResponse
            | CmaError::LlmApiError { .. }
            | CmaError::AuthError { .. }
            | CmaError::RateLimited { .. }
            | CmaError::ApiTimeout { .. }
            | CmaError::Transport(_)
            | CmaError::ProviderError(_)
            | CmaError::ProviderNotConfigured { .. } => ErrorKind::UpstreamFailure,

            CmaError::InvalidConfig(_)
            | CmaError::RenderFailed(_)
            | CmaError::OutputWriteFailed { .. }
            | CmaError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt at the model call could plausibly succeed.
    ///
    /// Malformed JSON is deliberately excluded: the same prompt tends to
    /// produce the same shape of reply.
    pub fn is_transient(&self) -> bool {
        match self {
            CmaError::ApiTimeout { .. }
            | CmaError::Transport(_)
            | CmaError::ProviderError(_)
            | CmaError::RateLimited { .. } => true,
            CmaError::LlmApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
