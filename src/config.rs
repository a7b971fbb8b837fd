//! Configuration types for analysis requests and the HTTP service.
//!
//! Two structs, two scopes:
//!
//! * [`AnalysisConfig`] controls the model call: which model, how many
//!   tokens, how long to wait, whether to retry. It is shared by the HTTP
//!   service, the CLI and library callers.
//! * [`ServiceConfig`] adds what only the HTTP boundary needs: the route,
//!   upload ceilings and the server-held credential.
//!
//! Both are built through builders that validate in `build()`, so a service
//! never starts with a zero timeout or a zero upload ceiling.

use crate::error::CmaError;
use crate::pipeline::llm::ModelClient;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default model for the Anthropic Messages client.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default Anthropic API root.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// `anthropic-version` header value sent with every request.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Per-file upload ceiling: 20 MiB.
pub const DEFAULT_MAX_FILE_BYTES: usize = 20 * 1024 * 1024;

/// Configuration for one model call.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use cma_report::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("claude-sonnet-4-20250514")
///     .api_timeout_secs(90)
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 1);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// The schema'd JSON for a dozen comps plus agent contacts fits in about
    /// 2 500 tokens; a truncated reply is unparseable, so leave headroom.
    pub max_tokens: usize,

    /// Sampling temperature. `None` leaves the provider default in place.
    pub temperature: Option<f32>,

    /// Per-attempt timeout for the model call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Extra attempts after a transient failure. Default: 0 (single attempt).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Root URL of the Anthropic API. Overridable for proxies and tests.
    pub anthropic_base_url: String,

    /// Value of the `anthropic-version` header.
    pub anthropic_version: String,

    /// edgequake-llm provider name (e.g. "openai", "gemini") used by
    /// [`crate::analyze::resolve_client_from_env`] instead of Anthropic.
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model client. Takes precedence over everything else,
    /// including per-request credentials.
    pub client: Option<Arc<dyn ModelClient>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: None,
            api_timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            provider_name: None,
            provider: None,
            client: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn ModelClient>"))
            .finish()
    }
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 1.0));
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn anthropic_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.anthropic_base_url = url.into();
        self
    }

    pub fn anthropic_version(mut self, version: impl Into<String>) -> Self {
        self.config.anthropic_version = version.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, CmaError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(CmaError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(CmaError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(CmaError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !(c.anthropic_base_url.starts_with("http://")
            || c.anthropic_base_url.starts_with("https://"))
        {
            return Err(CmaError::InvalidConfig(format!(
                "anthropic_base_url must be an HTTP(S) URL, got '{}'",
                c.anthropic_base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Service ──────────────────────────────────────────────────────────────

/// Configuration for the HTTP service.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Path the report endpoint is mounted on. Default: `/api/generate-cma`.
    pub route: String,

    /// Ceiling for a single uploaded file. Default: 20 MiB.
    pub max_file_bytes: usize,

    /// Maximum number of file parts in one request. Default: 20.
    pub max_files: usize,

    /// Server-held API key, selected by the `USE_SERVER_KEY` sentinel.
    /// `None` makes the sentinel resolve to "API key required".
    pub server_api_key: Option<String>,

    /// Model-call settings shared by every request.
    pub analysis: AnalysisConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            route: "/api/generate-cma".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: 20,
            server_api_key: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("route", &self.route)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("max_files", &self.max_files)
            .field(
                "server_api_key",
                &self.server_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("analysis", &self.analysis)
            .finish()
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Upper bound on the whole request body: every file at its ceiling,
    /// plus 1 MiB for the text fields and multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(self.max_files)
            .saturating_add(1024 * 1024)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.config.route = route.into();
        self
    }

    pub fn max_file_bytes(mut self, bytes: usize) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    /// Set the server-held key. Empty strings are treated as "no key".
    pub fn server_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.server_api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.config.analysis = analysis;
        self
    }

    pub fn build(self) -> Result<ServiceConfig, CmaError> {
        let c = &self.config;
        if !c.route.starts_with('/') {
            return Err(CmaError::InvalidConfig(format!(
                "route must start with '/', got '{}'",
                c.route
            )));
        }
        if c.max_file_bytes == 0 {
            return Err(CmaError::InvalidConfig("max_file_bytes must be ≥ 1".into()));
        }
        if c.max_files == 0 {
            return Err(CmaError::InvalidConfig("max_files must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
