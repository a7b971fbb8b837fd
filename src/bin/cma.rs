//! CLI binary for cma-report.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` / `ServiceConfig` and runs one of three commands.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cma_report::analyze::{self, load_files, load_record, render_report_to_file};
use cma_report::{AnalysisConfig, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service; USE_SERVER_KEY requests use ANTHROPIC_API_KEY
  cma serve --bind 0.0.0.0:3000

  # Analyse local files and write the report
  cma analyze mls_export.pdf comps.png --notes "New roof 2023" -o CMA_Report.docx

  # Keep the Analysis Record for later
  cma analyze mls_export.pdf --json > record.json

  # Re-render a saved record without calling the model
  cma render record.json -o CMA_Report.docx

HTTP ENDPOINT (serve):
  POST /api/generate-cma   multipart form
    files    one or more documents (PDF, images, text)
    notes    optional agent notes
    apiKey   caller's Anthropic key, or USE_SERVER_KEY
  → 200 CMA_Report.docx | 400/405/413 {"error"} | 500 {"error","details"}

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Server-held key (serve) / default client (analyze)
  EDGEQUAKE_LLM_PROVIDER  Use an edgequake-llm provider for analyze (openai, gemini, …)
  CMA_BIND                Listen address for serve
  CMA_MODEL               Model ID
  CMA_MAX_FILE_MB         Per-file upload ceiling in MiB
  CMA_API_TIMEOUT         Per-attempt model timeout in seconds
  CMA_MAX_RETRIES         Retries on transient model failures
  CMA_MAX_TOKENS          Max output tokens
  RUST_LOG                Overrides --verbose / --quiet
"#;

/// Generate Comparative Market Analysis reports from property documents.
#[derive(Parser, Debug)]
#[command(
    name = "cma",
    version,
    about = "Generate Comparative Market Analysis (.docx) reports from property documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CMA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CMA_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),

    /// Analyse local files with the model and write a report.
    Analyze(AnalyzeArgs),

    /// Render a saved Analysis Record (JSON) into a report.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model ID.
    #[arg(long, global = true, env = "CMA_MODEL", default_value = cma_report::config::DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider for `analyze` (openai, anthropic, gemini, ollama, …).
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Max output tokens.
    #[arg(long, global = true, env = "CMA_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature (provider default when unset).
    #[arg(long, global = true, env = "CMA_TEMPERATURE")]
    temperature: Option<f32>,

    /// Per-attempt model call timeout in seconds.
    #[arg(long, global = true, env = "CMA_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Retries on transient model failures (timeouts, 429, 5xx).
    #[arg(long, global = true, env = "CMA_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "CMA_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Endpoint path.
    #[arg(long, env = "CMA_ROUTE", default_value = "/api/generate-cma")]
    route: String,

    /// Key used when a request sends apiKey=USE_SERVER_KEY.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    server_api_key: Option<String>,

    /// Per-file upload ceiling in MiB.
    #[arg(long, env = "CMA_MAX_FILE_MB", default_value_t = 20)]
    max_file_mb: usize,

    /// Maximum number of files per request.
    #[arg(long, env = "CMA_MAX_FILES", default_value_t = 20)]
    max_files: usize,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Documents to analyse (PDF, images, text).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Extra context for the model (condition, upgrades, motivation).
    #[arg(long)]
    notes: Option<String>,

    /// Report path.
    #[arg(short, long, default_value = "CMA_Report.docx")]
    output: PathBuf,

    /// Print the Analysis Record as JSON instead of writing a report.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Analysis Record JSON (code fences are tolerated).
    input: PathBuf,

    /// Report path.
    #[arg(short, long, default_value = "CMA_Report.docx")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let analysis = build_analysis_config(&cli.model)?;

    match cli.command {
        Command::Serve(args) => serve(args, analysis).await,
        Command::Analyze(args) => run_analyze(args, analysis, cli.quiet).await,
        Command::Render(args) => run_render(args, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs, analysis: AnalysisConfig) -> Result<()> {
    let mut builder = ServiceConfig::builder()
        .route(args.route)
        .max_file_bytes(args.max_file_mb.saturating_mul(1024 * 1024))
        .max_files(args.max_files)
        .analysis(analysis);
    if let Some(key) = args.server_api_key {
        builder = builder.server_api_key(key);
    }
    let config = builder.build().context("Invalid service configuration")?;

    cma_report::run_server(config, args.bind)
        .await
        .with_context(|| format!("Server on {} failed", args.bind))
}

async fn run_analyze(args: AnalyzeArgs, config: AnalysisConfig, quiet: bool) -> Result<()> {
    let files = load_files(args.files.as_slice())
        .await
        .context("Failed to read input files")?;
    let client =
        analyze::resolve_client_from_env(&config).context("No model client available")?;

    if args.json {
        let record = analyze::request_analysis(client.as_ref(), &files, args.notes.as_deref(), &config)
            .await
            .context("Analysis failed")?;
        let json = serde_json::to_string_pretty(&record).context("Failed to serialise record")?;
        println!("{json}");
        return Ok(());
    }

    let analysis = analyze::analyze(client.as_ref(), &files, args.notes.as_deref(), &config)
        .await
        .context("Analysis failed")?;
    let written = render_report_to_file(&analysis.record, &args.output)
        .await
        .context("Failed to write report")?;

    if !quiet {
        eprintln!(
            "{}  {} file(s)  {}ms  →  {}  {}",
            green("✔"),
            analysis.stats.file_count,
            analysis.stats.llm_duration_ms,
            bold(&args.output.display().to_string()),
            dim(&format!("{written} bytes")),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&analysis.stats.input_tokens.to_string()),
            dim(&analysis.stats.output_tokens.to_string()),
        );
    }
    Ok(())
}

async fn run_render(args: RenderArgs, quiet: bool) -> Result<()> {
    let record = load_record(&args.input)
        .await
        .with_context(|| format!("Failed to load record from {:?}", args.input))?;
    let written = render_report_to_file(&record, &args.output)
        .await
        .context("Failed to write report")?;

    if !quiet {
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&args.output.display().to_string()),
            dim(&format!("{written} bytes")),
        );
    }
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_analysis_config(args: &ModelArgs) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .model(args.model.clone())
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout)
        .max_retries(args.max_retries);
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref name) = args.provider {
        if !name.is_empty() {
            builder = builder.provider_name(name.clone());
        }
    }
    builder.build().context("Invalid analysis configuration")
}
