//! Model interaction: send the prompt plus attachments, get one text reply.
//!
//! Everything that talks to a model sits behind the [`ModelClient`] trait so
//! the rest of the pipeline (and the tests) never care which backend is in
//! use. Two backends ship:
//!
//! * [`AnthropicClient`] — calls the Anthropic Messages API directly with a
//!   caller-chosen API key. This is what the HTTP service uses, because the
//!   key differs per request.
//! * [`ProviderClient`] — adapts any edgequake-llm [`LLMProvider`] (OpenAI,
//!   Gemini, Ollama, …) whose credentials come from the environment. Used by
//!   the CLI and by library callers that already hold a provider.
//!
//! ## Timeout and retry
//!
//! [`request_completion`] bounds every attempt by `api_timeout_secs`, so a
//! hung upstream surfaces as [`CmaError::ApiTimeout`] instead of blocking the
//! request forever. Transient failures (timeouts, transport errors, 429,
//! 5xx) are retried up to `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^attempt`). The default of zero retries keeps the
//! single-attempt behaviour; the retry budget is opt-in.

use crate::config::AnalysisConfig;
use crate::error::CmaError;
use crate::pipeline::encode::{Attachment, AttachmentKind};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Text returned by one model call, with token accounting when available.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A backend that can answer one prompt-plus-files request with text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &str;

    /// Perform exactly one call. Retries and timeouts are the caller's job.
    async fn complete(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<Completion, CmaError>;
}

/// Drive one model call with a per-attempt timeout and bounded retries.
pub async fn request_completion(
    client: &dyn ModelClient,
    prompt: &str,
    attachments: &[Attachment],
    config: &AnalysisConfig,
) -> Result<Completion, CmaError> {
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let start = Instant::now();
        let result = match timeout(limit, client.complete(prompt, attachments)).await {
            Ok(result) => result,
            Err(_) => Err(CmaError::ApiTimeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(completion) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    client.name(),
                    completion.input_tokens,
                    completion.output_tokens,
                    start.elapsed()
                );
                return Ok(completion);
            }
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = match &e {
                    CmaError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => secs.saturating_mul(1000),
                    _ => config
                        .retry_backoff_ms
                        .saturating_mul(2u64.saturating_pow(attempt - 1)),
                };
                warn!(
                    "{}: attempt {} failed: {}; retry {}/{} after {}ms",
                    client.name(),
                    attempt,
                    e,
                    attempt,
                    config.max_retries,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Anthropic Messages API ───────────────────────────────────────────────

/// Direct client for `POST {base_url}/v1/messages`.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    version: String,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, config: &AnalysisConfig) -> Result<Self, CmaError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CmaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            version: config.anthropic_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text {
        text: &'a str,
    },
    Image {
        source: BlockSource<'a>,
    },
    Document {
        source: BlockSource<'a>,
        title: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockSource<'a> {
    Base64 { media_type: &'a str, data: &'a str },
    Text { media_type: &'static str, data: String },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// One content block per attachment, in upload order, then the prompt.
fn content_blocks<'a>(prompt: &'a str, attachments: &'a [Attachment]) -> Vec<ContentBlock<'a>> {
    let mut blocks = Vec::with_capacity(attachments.len() + 1);
    for att in attachments {
        let base64 = BlockSource::Base64 {
            media_type: &att.media_type,
            data: &att.data,
        };
        let block = match att.kind {
            AttachmentKind::Image => ContentBlock::Image { source: base64 },
            AttachmentKind::Text => ContentBlock::Document {
                source: BlockSource::Text {
                    media_type: "text/plain",
                    data: att.text().unwrap_or_default(),
                },
                title: &att.file_name,
            },
            AttachmentKind::Pdf => ContentBlock::Document {
                source: base64,
                title: &att.file_name,
            },
            AttachmentKind::Other => {
                warn!(
                    "Skipping {} ({}): media type not accepted by the Messages API",
                    att.file_name, att.media_type
                );
                continue;
            }
        };
        blocks.push(block);
    }
    blocks.push(ContentBlock::Text { text: prompt });
    blocks
}

fn build_request<'a>(
    model: &'a str,
    max_tokens: usize,
    temperature: Option<f32>,
    prompt: &'a str,
    attachments: &'a [Attachment],
) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens,
        temperature,
        messages: vec![RequestMessage {
            role: "user",
            content: content_blocks(prompt, attachments),
        }],
    }
}

/// Concatenate the text blocks of a Messages API reply.
fn completion_from_response(response: MessagesResponse) -> Result<Completion, CmaError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.trim().is_empty() {
        return Err(CmaError::EmptyResponse);
    }
    let usage = response.usage.unwrap_or(Usage {
        input_tokens: 0,
        output_tokens: 0,
    });
    Ok(Completion {
        text,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
    })
}

/// Map a non-success status and its body to an error.
fn status_error(status: u16, retry_after: Option<u64>, body: &str) -> CmaError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match status {
        401 | 403 => CmaError::AuthError { detail: message },
        429 => CmaError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => CmaError::LlmApiError { status, message },
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<Completion, CmaError> {
        let body = build_request(
            &self.model,
            self.max_tokens,
            self.temperature,
            prompt,
            attachments,
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .json(&body)
            .send()
            .await
            .map_err(|e| CmaError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, &text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CmaError::Transport(format!("unreadable response body: {e}")))?;
        completion_from_response(parsed)
    }
}

// ── edgequake-llm provider adapter ───────────────────────────────────────

/// Adapter over an edgequake-llm provider.
///
/// Providers take images, not arbitrary documents, so text attachments are
/// inlined above the prompt and every other attachment travels as
/// [`edgequake_llm::ImageData`] with its declared media type.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Prompt text with every text attachment inlined ahead of it.
fn inline_text_attachments(prompt: &str, attachments: &[Attachment]) -> String {
    let mut out = String::new();
    for att in attachments.iter().filter(|a| a.kind == AttachmentKind::Text) {
        out.push_str(&format!("--- {} ---\n", att.file_name));
        out.push_str(&att.text().unwrap_or_default());
        out.push_str("\n\n");
    }
    out.push_str(prompt);
    out
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn name(&self) -> &str {
        "provider"
    }

    async fn complete(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<Completion, CmaError> {
        let text = inline_text_attachments(prompt, attachments);
        let images = attachments
            .iter()
            .filter(|a| match a.kind {
                AttachmentKind::Pdf | AttachmentKind::Image => true,
                AttachmentKind::Text => false,
                AttachmentKind::Other => {
                    warn!("Skipping {} ({}): unsupported media type", a.file_name, a.media_type);
                    false
                }
            })
            .map(Attachment::to_image_data)
            .collect::<Vec<_>>();

        let messages = vec![ChatMessage::user_with_images(text.as_str(), images)];
        let options = CompletionOptions {
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CmaError::ProviderError(format!("{e}")))?;

        if response.content.trim().is_empty() {
            return Err(CmaError::EmptyResponse);
        }
        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_upload;
    use crate::pipeline::input::UploadedFile;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<Completion, CmaError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Completion, CmaError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _: &str, _: &[Attachment]) -> Result<Completion, CmaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CmaError::EmptyResponse))
        }
    }

    struct Hanging;

    #[async_trait]
    impl ModelClient for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _: &str, _: &[Attachment]) -> Result<Completion, CmaError> {
            sleep(Duration::from_secs(30)).await;
            Ok(Completion::default())
        }
    }

    fn ok(text: &str) -> Result<Completion, CmaError> {
        Ok(Completion {
            text: text.into(),
            ..Default::default()
        })
    }

    fn fast_retry_config(retries: u32) -> AnalysisConfig {
        AnalysisConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let client = Scripted::new(vec![Err(CmaError::Transport("reset".into())), ok("{}")]);
        let err = request_completion(&client, "p", &[], &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CmaError::Transport(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_when_enabled() {
        let client = Scripted::new(vec![
            Err(CmaError::LlmApiError {
                status: 529,
                message: "overloaded".into(),
            }),
            ok("{}"),
        ]);
        let out = request_completion(&client, "p", &[], &fast_retry_config(2))
            .await
            .unwrap();
        assert_eq!(out.text, "{}");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let client = Scripted::new(vec![
            Err(CmaError::AuthError {
                detail: "invalid x-api-key".into(),
            }),
            ok("{}"),
        ]);
        let err = request_completion(&client, "p", &[], &fast_retry_config(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CmaError::AuthError { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let config = AnalysisConfig::builder().api_timeout_secs(1).build().unwrap();
        let err = request_completion(&Hanging, "p", &[], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, CmaError::ApiTimeout { secs: 1 }));
    }

    #[test]
    fn request_body_orders_attachments_before_prompt() {
        let files = [
            UploadedFile::new(Some("cma.pdf"), None, b"%PDF-1.7".to_vec(), 0),
            UploadedFile::new(Some("front.png"), Some("image/png"), vec![1, 2, 3], 1),
            UploadedFile::new(Some("notes.txt"), Some("text/plain"), b"corner lot".to_vec(), 2),
        ];
        let atts: Vec<_> = files.iter().map(encode_upload).collect();
        let req = build_request("m", 4096, None, "analyze", &atts);
        let v = serde_json::to_value(&req).unwrap();

        assert_eq!(v["model"], "m");
        assert!(v.get("temperature").is_none());
        let content = v["messages"][0]["content"].as_array().unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(content.len(), 4);

        assert_eq!(content[0]["type"], "document");
        assert_eq!(content[0]["title"], "cma.pdf");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "application/pdf");

        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["media_type"], "image/png");

        assert_eq!(content[2]["source"]["type"], "text");
        assert_eq!(content[2]["source"]["data"], "corner lot");

        assert_eq!(content[3]["type"], "text");
        assert_eq!(content[3]["text"], "analyze");
    }

    #[test]
    fn unsupported_media_types_are_left_out_of_the_request() {
        let files = [
            UploadedFile::new(
                Some("listing.docx"),
                Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
                b"PK\x03\x04".to_vec(),
                0,
            ),
            UploadedFile::new(Some("cma.pdf"), None, b"%PDF-1.7".to_vec(), 1),
        ];
        let atts: Vec<_> = files.iter().map(encode_upload).collect();
        assert_eq!(atts[0].kind, AttachmentKind::Other);

        let req = build_request("m", 4096, None, "analyze", &atts);
        let v = serde_json::to_value(&req).unwrap();
        let content = v["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["title"], "cma.pdf");
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn response_text_blocks_are_concatenated() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}],
                "usage":{"input_tokens":10,"output_tokens":4}}"#,
        )
        .unwrap();
        let c = completion_from_response(resp).unwrap();
        assert_eq!(c.text, "{\"a\":1}");
        assert_eq!((c.input_tokens, c.output_tokens), (10, 4));
    }

    #[test]
    fn empty_response_is_an_error() {
        let resp: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(matches!(
            completion_from_response(resp),
            Err(CmaError::EmptyResponse)
        ));
    }

    #[test]
    fn status_errors_map_by_code() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        match status_error(401, None, body) {
            CmaError::AuthError { detail } => assert_eq!(detail, "invalid x-api-key"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            status_error(429, Some(7), ""),
            CmaError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        match status_error(500, None, "upstream exploded") {
            CmaError::LlmApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_attachments_are_inlined_for_providers() {
        let file = UploadedFile::new(Some("mls.csv"), Some("text/csv"), b"addr,price".to_vec(), 0);
        let text = inline_text_attachments("PROMPT", &[encode_upload(&file)]);
        assert_eq!(text, "--- mls.csv ---\naddr,price\n\nPROMPT");
    }
}
