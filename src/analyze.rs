//! Public entry points: uploads → Analysis Record → `.docx` report.
//!
//! ## Why two halves?
//!
//! [`request_analysis`] is the only part that talks to a model; it is slow,
//! costs money and can fail upstream. [`render_report`] is a pure function
//! of the record. Keeping them apart lets the CLI re-render a saved record
//! offline, and lets tests cover rendering without a model at all.
//! [`generate_report`] chains both for the common case.

use crate::config::AnalysisConfig;
use crate::credential::ApiCredential;
use crate::error::CmaError;
use crate::pipeline::{docx, encode, format, input, layout, llm, postprocess};
use crate::pipeline::input::UploadedFile;
use crate::pipeline::llm::{AnthropicClient, ModelClient, ProviderClient};
use crate::prompts;
use crate::record::AnalysisRecord;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Timing and token accounting for one report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportStats {
    pub file_count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub llm_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A rendered report together with the record it was rendered from.
#[derive(Debug, Clone)]
pub struct Report {
    /// Complete `.docx` package.
    pub bytes: Vec<u8>,
    pub record: AnalysisRecord,
    pub stats: ReportStats,
}

/// Analysis plus the accounting gathered while obtaining it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub record: AnalysisRecord,
    pub stats: ReportStats,
}

/// Ask the model to analyse `files` and parse its reply.
///
/// # Errors
/// * [`CmaError::NoFiles`] when `files` is empty; no model call is made.
/// * Upstream errors from the model call (timeouts, HTTP status, transport).
/// * [`CmaError::MalformedResponse`] when the reply is not a JSON object.
pub async fn request_analysis(
    client: &dyn ModelClient,
    files: &[UploadedFile],
    notes: Option<&str>,
    config: &AnalysisConfig,
) -> Result<AnalysisRecord, CmaError> {
    analyze(client, files, notes, config)
        .await
        .map(|analysis| analysis.record)
}

/// Same as [`request_analysis`], keeping token and timing stats.
pub async fn analyze(
    client: &dyn ModelClient,
    files: &[UploadedFile],
    notes: Option<&str>,
    config: &AnalysisConfig,
) -> Result<Analysis, CmaError> {
    // ── Step 1: Refuse empty submissions before any network I/O ──────────
    if files.is_empty() {
        return Err(CmaError::NoFiles);
    }

    // ── Step 2: Encode attachments ───────────────────────────────────────
    let attachments = encode::encode_uploads(files);
    let total_bytes: usize = files.iter().map(UploadedFile::len).sum();
    info!(
        "Requesting analysis of {} file(s), {} bytes, via {}",
        files.len(),
        total_bytes,
        client.name()
    );

    // ── Step 3: Build the prompt ─────────────────────────────────────────
    let prompt = prompts::build_analysis_prompt(files.len(), notes);
    debug!("Prompt: {} chars", prompt.len());

    // ── Step 4: Model call ───────────────────────────────────────────────
    let llm_start = Instant::now();
    let completion = llm::request_completion(client, &prompt, &attachments, config).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 5: Strip fences and parse ───────────────────────────────────
    let record = postprocess::parse_analysis(&completion.text)?;
    info!(
        "Analysis received for {} in {}ms",
        subject_address(&record),
        llm_duration_ms
    );

    Ok(Analysis {
        record,
        stats: ReportStats {
            file_count: files.len(),
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            llm_duration_ms,
            ..ReportStats::default()
        },
    })
}

/// Render an Analysis Record into `.docx` bytes.
///
/// Never fails on missing or partial data; absent sections are omitted and
/// absent values render empty.
pub fn render_report(record: &AnalysisRecord) -> Result<Vec<u8>, CmaError> {
    let layout = layout::build_layout(record);
    docx::pack_report(&layout)
}

/// Render a record and write it to `path`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// half-written document behind.
pub async fn render_report_to_file(
    record: &AnalysisRecord,
    path: impl AsRef<Path>,
) -> Result<usize, CmaError> {
    let bytes = render_report(record)?;
    write_atomic(path.as_ref(), &bytes).await?;
    Ok(bytes.len())
}

/// Full pipeline: analyse, then render.
pub async fn generate_report(
    client: &dyn ModelClient,
    files: &[UploadedFile],
    notes: Option<&str>,
    config: &AnalysisConfig,
) -> Result<Report, CmaError> {
    let total_start = Instant::now();
    let Analysis { record, mut stats } = analyze(client, files, notes, config).await?;

    let render_start = Instant::now();
    let bytes = render_report(&record)?;
    stats.render_duration_ms = render_start.elapsed().as_millis() as u64;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Report ready: {} bytes, {} in / {} out tokens, {}ms total",
        bytes.len(),
        stats.input_tokens,
        stats.output_tokens,
        stats.total_duration_ms
    );

    Ok(Report {
        bytes,
        record,
        stats,
    })
}

/// Read local files into uploads, in the order given.
pub async fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<UploadedFile>, CmaError> {
    let mut files = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        files.push(input::read_local_file(path.as_ref(), index).await?);
    }
    Ok(files)
}

/// Load a saved Analysis Record (raw model output is fine; fences are
/// stripped the same way as for a live reply).
pub async fn load_record(path: impl AsRef<Path>) -> Result<AnalysisRecord, CmaError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CmaError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    postprocess::parse_analysis(&raw)
}

// ── Client resolution ────────────────────────────────────────────────────

/// Pick the model client for one HTTP request.
///
/// A pre-built `config.client` wins (tests, custom middleware); otherwise
/// an [`AnthropicClient`] is built with the request's credential.
pub fn resolve_client(
    credential: &ApiCredential,
    config: &AnalysisConfig,
) -> Result<Arc<dyn ModelClient>, CmaError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    Ok(Arc::new(AnthropicClient::new(credential.key(), config)?))
}

/// Pick the model client for local use, from most-specific to
/// least-specific:
///
/// 1. **Pre-built client** (`config.client`).
/// 2. **Pre-built provider** (`config.provider`), wrapped in a
///    [`ProviderClient`].
/// 3. **Named provider** (`config.provider_name`): the factory reads that
///    provider's API key from the environment.
/// 4. **`ANTHROPIC_API_KEY`**: direct [`AnthropicClient`], so documents go
///    out as native PDF blocks.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_client_from_env(config: &AnalysisConfig) -> Result<Arc<dyn ModelClient>, CmaError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderClient::new(Arc::clone(provider), config)));
    }

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, &config.model)?;
        return Ok(Arc::new(ProviderClient::new(provider, config)));
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.trim().is_empty() {
            return Ok(Arc::new(AnthropicClient::new(key, config)?));
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CmaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, or name a provider with EDGEQUAKE_LLM_PROVIDER.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(ProviderClient::new(provider, config)))
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, CmaError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        CmaError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn subject_address(record: &AnalysisRecord) -> String {
    let address = format::text(record.property_address.as_ref());
    if address.is_empty() {
        layout::ADDRESS_FALLBACK.to_string()
    } else {
        address
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CmaError> {
    let write_err = |e| CmaError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("docx.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
