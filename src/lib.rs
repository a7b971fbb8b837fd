//! # cma-report
//!
//! Turn a stack of property documents into a Comparative Market Analysis
//! (CMA) report in `.docx` form.
//!
//! ## Why this crate?
//!
//! A listing agent preparing a CMA has the material already (MLS exports,
//! comp sheets, a purchase contract) but spends an hour retyping numbers
//! into a document. This crate hands the raw files to a language model
//! with a fixed instruction prompt, gets back one JSON Analysis Record, and
//! lays that record out as a consistently styled report: investment summary,
//! key findings, comp tables, agent contacts and market insights.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads (+ notes)
//!  │
//!  ├─ 1. Input    name, type-sniff and bound the uploaded files
//!  ├─ 2. Encode   base64 each file with its media type
//!  ├─ 3. Model    one call: attachments + prompt → text (timeout, retry)
//!  ├─ 4. Parse    strip code fences, parse the JSON object
//!  ├─ 5. Layout   Analysis Record → ordered blocks, tables, callouts
//!  └─ 6. Pack     blocks → .docx bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cma_report::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Client auto-detected from ANTHROPIC_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let config = AnalysisConfig::default();
//!     let client = analyze::resolve_client_from_env(&config)?;
//!     let files = analyze::load_files(&["mls_export.pdf", "comps.png"]).await?;
//!     let report = analyze::generate_report(client.as_ref(), &files, Some("New roof 2023"), &config).await?;
//!     std::fs::write("CMA_Report.docx", &report.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Serving
//!
//! [`server::create_router`] returns an axum [`Router`](axum::Router) with a
//! single multipart endpoint (default `/api/generate-cma`). Each request
//! brings its own API key, or the sentinel
//! [`USE_SERVER_KEY`](credential::SERVER_KEY_SENTINEL) to use the key held
//! in [`ServiceConfig::server_api_key`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cma` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod credential;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    generate_report, render_report, render_report_to_file, request_analysis, Report, ReportStats,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ServiceConfig, ServiceConfigBuilder};
pub use credential::{resolve_credential, ApiCredential, CredentialSource, SERVER_KEY_SENTINEL};
pub use error::{CmaError, ErrorKind};
pub use pipeline::input::UploadedFile;
pub use pipeline::llm::{AnthropicClient, Completion, ModelClient, ProviderClient};
pub use record::{AnalysisRecord, Scalar};
pub use server::{create_router, run_server};
