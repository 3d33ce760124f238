//! Upstream LLM provider adapters
//!
//! Each vendor API sits behind the [`ChatProvider`] trait. Adapters own all
//! vendor-specific request building and response parsing; everything above
//! this module only sees [`Completion`] and [`StreamFragment`].

pub mod gemini;
pub mod openai;
pub mod selector;
pub mod sse;

use crate::config::{Config, ProviderCredentials};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use selector::{SelectionError, select_provider};

/// Sampling temperature sent with every upstream call
pub const TEMPERATURE: f32 = 0.7;

/// Upper bound on generated tokens sent with every upstream call
pub const MAX_OUTPUT_TOKENS: u32 = 2048;

/// System instruction for the OpenAI-compatible path
pub const SYSTEM_INSTRUCTION: &str = "You are a concise assistant.";

/// Supported upstream vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenAi, ProviderId::Gemini];

    /// Wire identifier used in requests, responses and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Human-readable vendor name used in client-facing error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI",
            ProviderId::Gemini => "Gemini",
        }
    }

    /// Prefix of the environment variables configuring this provider
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI",
            ProviderId::Gemini => "GEMINI",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "gpt-4o-mini",
            ProviderId::Gemini => "gemini-2.5-flash",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "https://api.openai.com/v1",
            ProviderId::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a provider name is not one of the supported vendors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider '{0}'")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownProvider(name.to_string()))
    }
}

/// Failure talking to an upstream vendor API
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network, TLS or body decoding failure inside the HTTP client
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Upstream answered 2xx but the payload had no usable content
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Upstream reported an error inside an already-open stream
    #[error("stream error: {0}")]
    Stream(String),
}

/// A message bound to the model that will serve it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    message: String,
    model: String,
}

impl Prompt {
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Result of a one-shot completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
}

/// One normalised unit of an upstream stream
///
/// Either field may be absent: the first OpenAI chunk carries only a role,
/// and the last chunk of either vendor may carry only a finish reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFragment {
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
}

/// Ordered upstream fragments, ending at upstream completion or first error
pub type FragmentStream = BoxStream<'static, Result<StreamFragment, ProviderError>>;

/// Per-vendor adapter
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Model used when the caller does not name one
    fn default_model(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, ProviderError>;

    /// Open a streaming call. Errors before the first byte are returned here;
    /// later errors are yielded by the stream.
    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream, ProviderError>;
}

/// Caller-supplied model wins; otherwise the provider default, verbatim
pub fn resolve_model(requested: Option<&str>, default_model: &str) -> String {
    requested.unwrap_or(default_model).to_string()
}

/// Read a string at a JSON pointer, swallowing any shape mismatch
///
/// Used for finish reasons, which are informational only.
pub(crate) fn best_effort_str(value: &serde_json::Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

/// Message of an in-band `{"error": ...}` payload, if the chunk is one
///
/// Both vendors may replace a stream chunk with an error object after the
/// 200 status line has been sent.
pub(crate) fn in_band_error(value: &serde_json::Value) -> Option<String> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let message = best_effort_str(error, "/message")
        .or_else(|| error.as_str().map(str::to_owned))
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

/// Turn a non-2xx upstream response into [`ProviderError::Api`]
///
/// Both vendors report failures as `{"error": {"message": ...}}`; anything
/// else falls back to the raw body or the status reason phrase.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| best_effort_str(&v, "/error/message"))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

/// The providers that have credentials configured
///
/// A provider is present iff its API key was set at startup, so presence in
/// this set is the "configured" predicate used by provider selection.
#[derive(Clone, Default)]
pub struct ProviderSet {
    openai: Option<Arc<dyn ChatProvider>>,
    gemini: Option<Arc<dyn ChatProvider>>,
}

impl ProviderSet {
    /// Build adapters for every provider whose API key is configured
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let mut set = Self::default();
        for id in ProviderId::ALL {
            let credentials = config.credentials(id);
            let Some(api_key) = credentials.api_key() else {
                tracing::info!(provider = %id, "No API key configured, provider disabled");
                continue;
            };

            tracing::info!(
                provider = %id,
                model = %credentials.model(),
                base_url = %credentials.base_url(),
                "Provider enabled"
            );
            set = set.with_provider(build_provider(id, client.clone(), api_key, &credentials));
        }

        Ok(set)
    }

    /// Register (or replace) the adapter for `provider.id()`
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        match provider.id() {
            ProviderId::OpenAi => self.openai = Some(provider),
            ProviderId::Gemini => self.gemini = Some(provider),
        }
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<&Arc<dyn ChatProvider>> {
        match id {
            ProviderId::OpenAi => self.openai.as_ref(),
            ProviderId::Gemini => self.gemini.as_ref(),
        }
    }

    pub fn is_configured(&self, id: ProviderId) -> bool {
        self.get(id).is_some()
    }

    /// Configured providers in declaration order
    pub fn configured(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.is_configured(*id))
            .collect()
    }

    /// Apply the selection policy and return the chosen adapter
    pub fn select(&self, requested: Option<&str>) -> Result<Arc<dyn ChatProvider>, SelectionError> {
        let id = select_provider(requested, |id| self.is_configured(id))?;
        self.get(id)
            .cloned()
            .ok_or(SelectionError::NoneConfigured)
    }
}

fn build_provider(
    id: ProviderId,
    client: reqwest::Client,
    api_key: &str,
    credentials: &ProviderCredentials,
) -> Arc<dyn ChatProvider> {
    match id {
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new(
            client,
            api_key,
            credentials.base_url(),
            credentials.model(),
        )),
        ProviderId::Gemini => Arc::new(GeminiProvider::new(
            client,
            api_key,
            credentials.base_url(),
            credentials.model(),
        )),
    }
}
