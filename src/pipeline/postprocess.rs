//! Post-processing: turn the model's reply text into an [`AnalysisRecord`].
//!
//! The prompt says "Return ONLY the JSON", and models mostly comply, but a
//! reply wrapped in a ```` ```json ```` fence is common enough that it must
//! not fail the request. The normalisation here is deliberately narrow: it
//! removes the literal fence markers and surrounding whitespace and nothing
//! else. It is not a Markdown parser; a reply with prose around the JSON
//! still fails, as it should.
//!
//! Two rules, in order:
//! 1. Strip every ```` ```json ```` / ```` ``` ```` marker (and the newline
//!    that follows it), then trim.
//! 2. Parse the remainder as a JSON object. Any failure is
//!    [`CmaError::MalformedResponse`]; there is never a silent empty record.

use crate::error::CmaError;
use crate::record::AnalysisRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

// ── Rule 1: Strip code fences ────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\n?").unwrap());

/// Remove fenced-code markers and surrounding whitespace.
///
/// A fenced reply and the same reply without fences produce identical output.
pub fn strip_code_fences(input: &str) -> String {
    RE_FENCE.replace_all(input, "").trim().to_string()
}

// ── Rule 2: Parse ────────────────────────────────────────────────────────

/// Clean a raw model reply and parse it into an [`AnalysisRecord`].
pub fn parse_analysis(raw: &str) -> Result<AnalysisRecord, CmaError> {
    let cleaned = strip_code_fences(raw);
    debug!(
        "Parsing analysis JSON ({} bytes raw, {} cleaned)",
        raw.len(),
        cleaned.len()
    );

    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| CmaError::MalformedResponse {
            detail: e.to_string(),
        })?;
    AnalysisRecord::from_value(value)
}
