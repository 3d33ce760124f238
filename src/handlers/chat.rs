//! Chat completion handler
//!
//! Handles POST /api/chat: one upstream call, one JSON reply.

use crate::error::{AppError, AppResult, MESSAGE_REQUIRED};
use crate::handlers::AppState;
use crate::metrics::{Endpoint, Outcome};
use crate::middleware::RequestId;
use crate::providers::ProviderId;
use crate::shared::dispatch::{Dispatch, prepare};
use axum::{
    Extension, Json,
    extract::{FromRequest, Request, State},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

/// Chat request from client
///
/// Validation is enforced during deserialization - a `ChatRequest` always
/// carries a non-blank message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl ChatRequest {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Explicitly requested provider name, if any
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Model override, if any
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawChatRequest {
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            provider: Option<String>,
            #[serde(default)]
            model: Option<String>,
        }

        let raw = RawChatRequest::deserialize(deserializer)?;

        let message = raw
            .message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| serde::de::Error::custom(MESSAGE_REQUIRED))?;

        // Blank means absent; anything else is forwarded exactly as sent
        let blank_to_none =
            |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(ChatRequest {
            message,
            provider: blank_to_none(raw.provider),
            model: blank_to_none(raw.model),
        })
    }
}

/// Any unreadable body is reported as a missing message
impl<S> FromRequest<S> for ChatRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<ChatRequest>::from_request(req, state).await {
            Ok(Json(request)) => Ok(request),
            Err(rejection) => {
                tracing::debug!(reason = %rejection.body_text(), "Unusable chat request body");
                Err(AppError::InvalidRequest(MESSAGE_REQUIRED.to_string()))
            }
        }
    }
}

/// Chat response to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    reply: String,
    provider: ProviderId,
    model: String,
    finish_reason: Option<String>,
}

impl ChatReply {
    pub fn new(
        reply: String,
        provider: ProviderId,
        model: impl Into<String>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            reply,
            provider,
            model: model.into(),
            finish_reason,
        }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }
}

/// POST /api/chat handler
///
/// Upstream failures are returned as 502 with the vendor's error text in
/// `detail`. No retry is attempted.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: AppResult<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let Dispatch { provider, prompt } = prepare(&state, request, Endpoint::Chat, request_id)?;
    let provider_id = provider.id();

    let started = Instant::now();
    let result = provider.complete(&prompt).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    state
        .metrics()
        .record_upstream_duration(provider_id, duration_ms);

    match result {
        Ok(completion) => {
            state
                .metrics()
                .record_request(Endpoint::Chat, provider_id, Outcome::Success);

            tracing::info!(
                request_id = %request_id,
                provider = %provider_id,
                model = %prompt.model(),
                response_length = completion.text.len(),
                finish_reason = ?completion.finish_reason,
                duration_ms = %duration_ms,
                "Chat request completed"
            );

            Ok(Json(ChatReply::new(
                completion.text,
                provider_id,
                prompt.model(),
                completion.finish_reason,
            )))
        }
        Err(source) => {
            state
                .metrics()
                .record_request(Endpoint::Chat, provider_id, Outcome::UpstreamError);

            tracing::error!(
                request_id = %request_id,
                provider = %provider_id,
                model = %prompt.model(),
                error = %source,
                duration_ms = %duration_ms,
                "Upstream completion failed"
            );

            Err(AppError::Upstream {
                provider: provider_id,
                source,
            })
        }
    }
}
