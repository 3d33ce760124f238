//! OpenAI-compatible chat completions adapter
//!
//! Talks to `POST {base_url}/chat/completions` with bearer auth. Streaming
//! responses are `chat.completion.chunk` frames terminated by `data: [DONE]`.

use super::sse::{Frame, decode_fragments};
use super::{
    ChatProvider, Completion, FragmentStream, MAX_OUTPUT_TOKENS, Prompt, ProviderError,
    ProviderId, SYSTEM_INSTRUCTION, StreamFragment, TEMPERATURE, best_effort_str, ensure_success,
    in_band_error,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ChatCompletionBody<'a> {
    fn new(prompt: &'a Prompt, stream: bool) -> Self {
        Self {
            model: prompt.model(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt.message(),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
            stream,
        }
    }
}

/// Adapter for OpenAI and API-compatible gateways
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: &str,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            default_model: default_model.into(),
        }
    }

    async fn send(&self, body: &ChatCompletionBody<'_>) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let response = self.send(&ChatCompletionBody::new(prompt, false)).await?;
        let value: Value = response.json().await?;
        parse_completion(&value)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream, ProviderError> {
        let response = self.send(&ChatCompletionBody::new(prompt, true)).await?;
        Ok(decode_fragments(response.bytes_stream().boxed(), parse_stream_data))
    }
}

/// Extract reply text and finish reason from a non-streaming response
pub fn parse_completion(value: &Value) -> Result<Completion, ProviderError> {
    let choice = value
        .pointer("/choices/0")
        .ok_or_else(|| ProviderError::InvalidResponse("response contained no choices".to_string()))?;

    // Refusals and tool-only replies carry a null content
    let text = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Completion {
        text,
        finish_reason: best_effort_str(choice, "/finish_reason"),
    })
}

/// Interpret one `data:` payload of a streaming response
pub fn parse_stream_data(data: &str) -> Frame {
    if data.trim() == DONE_MARKER {
        return Frame::End;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed OpenAI stream chunk");
            return Frame::Skip;
        }
    };

    if let Some(message) = in_band_error(&value) {
        return Frame::Error(message);
    }

    let fragment = StreamFragment {
        delta: best_effort_str(&value, "/choices/0/delta/content").filter(|s| !s.is_empty()),
        finish_reason: best_effort_str(&value, "/choices/0/finish_reason"),
    };

    if fragment == StreamFragment::default() {
        Frame::Skip
    } else {
        Frame::Fragment(fragment)
    }
}
