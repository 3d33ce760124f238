//! Streaming chat handler
//!
//! Handles POST /api/stream. Validation and provider selection failures are
//! ordinary JSON errors; once the provider is chosen the response is
//! committed as `200 text/event-stream` and every later failure is reported
//! in-band.
//!
//! # SSE Format
//!
//! ```text
//! data: {"delta":"He"}
//!
//! data: {"delta":"llo"}
//!
//! data: {"done":true,"provider":"gemini","model":"gemini-2.5-flash","finish_reason":"STOP"}
//!
//! ```
//!
//! A failure replaces the final frame with
//! `data: {"error":"stream_error","detail":"..."}`.

use crate::error::AppResult;
use crate::handlers::AppState;
use crate::handlers::chat::ChatRequest;
use crate::metrics::{Endpoint, Metrics, Outcome};
use crate::middleware::RequestId;
use crate::providers::ProviderId;
use crate::relay::{StreamEvent, relay_events};
use crate::shared::dispatch::{Dispatch, prepare};
use axum::{
    Extension,
    extract::State,
    http::{HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use std::time::Duration;

/// Tells nginx-style proxies not to buffer the response
pub const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

/// POST /api/stream handler
///
/// The upstream call is only opened when the response body is first polled.
/// If the client disconnects the body is dropped, which drops the upstream
/// response and stops reading from the provider.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: AppResult<ChatRequest>,
) -> AppResult<Response> {
    let Dispatch { provider, prompt } = prepare(&state, request, Endpoint::Stream, request_id)?;
    let provider_id = provider.id();

    tracing::info!(
        request_id = %request_id,
        provider = %provider_id,
        model = %prompt.model(),
        "Starting streaming response"
    );

    let mut outcome = StreamOutcome::new(state.metrics().clone(), provider_id, request_id);
    let events = relay_events(provider, prompt).map(move |event| {
        outcome.observe(&event);
        Ok::<_, Infallible>(to_sse_event(&event))
    });

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(ACCEL_BUFFERING_HEADER, HeaderValue::from_static("no"));

    Ok(response)
}

/// Frame one event as `data: <json>`
pub fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_default())
}

/// Records how one streaming request ended
///
/// Lives inside the response stream, so it is dropped with the body. A drop
/// before any terminal event means the client disconnected.
struct StreamOutcome {
    metrics: Metrics,
    provider: ProviderId,
    request_id: RequestId,
    settled: bool,
}

impl StreamOutcome {
    fn new(metrics: Metrics, provider: ProviderId, request_id: RequestId) -> Self {
        Self {
            metrics,
            provider,
            request_id,
            settled: false,
        }
    }

    fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta { .. } => self.metrics.record_stream_delta(self.provider),
            StreamEvent::Done { finish_reason, .. } => {
                self.settle(Outcome::Success);
                tracing::info!(
                    request_id = %self.request_id,
                    provider = %self.provider,
                    finish_reason = ?finish_reason,
                    "Streaming response completed"
                );
            }
            StreamEvent::Error { detail } => {
                self.settle(Outcome::StreamError);
                tracing::error!(
                    request_id = %self.request_id,
                    provider = %self.provider,
                    error = %detail,
                    "Streaming response ended with error"
                );
            }
        }
    }

    fn settle(&mut self, outcome: Outcome) {
        if !self.settled {
            self.settled = true;
            self.metrics
                .record_request(Endpoint::Stream, self.provider, outcome);
        }
    }
}

impl Drop for StreamOutcome {
    fn drop(&mut self) {
        if !self.settled {
            tracing::info!(
                request_id = %self.request_id,
                provider = %self.provider,
                "Client disconnected before stream completed"
            );
            self.settle(Outcome::ClientDisconnected);
        }
    }
}
