//! Gemini `generateContent` adapter
//!
//! One-shot calls use `models/{model}:generateContent`; streaming uses
//! `models/{model}:streamGenerateContent?alt=sse`, where every SSE frame is a
//! complete `GenerateContentResponse`.

use super::sse::{Frame, decode_fragments};
use super::{
    ChatProvider, Completion, FragmentStream, MAX_OUTPUT_TOKENS, Prompt, ProviderError,
    ProviderId, StreamFragment, TEMPERATURE, best_effort_str, ensure_success, in_band_error,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentBody<'a> {
    fn new(prompt: &'a Prompt) -> Self {
        Self {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: prompt.message(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

/// Adapter for the Gemini Developer API
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: &str,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    fn method_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        prompt: &Prompt,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateContentBody::new(prompt))
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let url = self.method_url(prompt.model(), "generateContent");
        let response = self.send(self.client.post(url), prompt).await?;
        let value: Value = response.json().await?;
        parse_completion(&value)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<FragmentStream, ProviderError> {
        let url = self.method_url(prompt.model(), "streamGenerateContent");
        let request = self.client.post(url).query(&[("alt", "sse")]);
        let response = self.send(request, prompt).await?;
        Ok(decode_fragments(response.bytes_stream().boxed(), parse_stream_data))
    }
}

/// Concatenated text of the first candidate's parts, if any part has text
fn candidate_text(value: &Value) -> Option<String> {
    let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

fn finish_reason(value: &Value) -> Option<String> {
    best_effort_str(value, "/candidates/0/finishReason")
}

/// Extract reply text and finish reason from a non-streaming response
pub fn parse_completion(value: &Value) -> Result<Completion, ProviderError> {
    if value.pointer("/candidates/0").is_none() {
        let reason = best_effort_str(value, "/promptFeedback/blockReason")
            .map(|r| format!("prompt blocked: {}", r))
            .unwrap_or_else(|| "response contained no candidates".to_string());
        return Err(ProviderError::InvalidResponse(reason));
    }

    Ok(Completion {
        text: candidate_text(value).unwrap_or_default(),
        finish_reason: finish_reason(value),
    })
}

/// Interpret one `data:` payload of a streaming response
pub fn parse_stream_data(data: &str) -> Frame {
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed Gemini stream chunk");
            return Frame::Skip;
        }
    };

    if let Some(message) = in_band_error(&value) {
        return Frame::Error(message);
    }

    let fragment = StreamFragment {
        delta: candidate_text(&value).filter(|s| !s.is_empty()),
        finish_reason: finish_reason(&value),
    };

    if fragment == StreamFragment::default() {
        Frame::Skip
    } else {
        Frame::Fragment(fragment)
    }
}
