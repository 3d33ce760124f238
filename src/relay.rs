//! Vendor-neutral streaming protocol
//!
//! Turns a provider's [`FragmentStream`] into the relay's own event sequence:
//! zero or more `Delta` events followed by exactly one terminal `Done` or
//! `Error` event.

use crate::providers::{ChatProvider, FragmentStream, Prompt, ProviderId};
use futures::stream::{self, Stream, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// Error label carried by in-band stream failures
pub const STREAM_ERROR: &str = "stream_error";

/// One event emitted to the downstream client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta {
        delta: String,
    },
    Done {
        provider: ProviderId,
        model: String,
        finish_reason: Option<String>,
    },
    Error {
        detail: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta { .. })
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StreamEvent::Delta { delta } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("delta", delta)?;
                map.end()
            }
            StreamEvent::Done {
                provider,
                model,
                finish_reason,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("done", &true)?;
                map.serialize_entry("provider", provider)?;
                map.serialize_entry("model", model)?;
                map.serialize_entry("finish_reason", finish_reason)?;
                map.end()
            }
            StreamEvent::Error { detail } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", STREAM_ERROR)?;
                map.serialize_entry("detail", detail)?;
                map.end()
            }
        }
    }
}

enum RelayState {
    Opening {
        provider: Arc<dyn ChatProvider>,
        prompt: Prompt,
    },
    Streaming {
        upstream: FragmentStream,
        finish_reason: Option<String>,
        deltas: usize,
    },
    Finished,
}

/// Lazily open the upstream stream and relay it as [`StreamEvent`]s
///
/// Nothing is sent upstream until the returned stream is first polled.
/// Events keep upstream order; empty deltas are dropped and the last
/// finish reason seen is reported on `Done`.
pub fn relay_events(
    provider: Arc<dyn ChatProvider>,
    prompt: Prompt,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let provider_id = provider.id();
    let model = prompt.model().to_string();

    stream::unfold(
        RelayState::Opening { provider, prompt },
        move |state| {
            let model = model.clone();
            async move {
                let mut state = state;
                loop {
                    state = match state {
                        RelayState::Opening { provider, prompt } => {
                            match provider.stream(&prompt).await {
                                Ok(upstream) => RelayState::Streaming {
                                    upstream,
                                    finish_reason: None,
                                    deltas: 0,
                                },
                                Err(e) => {
                                    tracing::warn!(
                                        provider = %provider_id,
                                        model = %model,
                                        error = %e,
                                        "Failed to open upstream stream"
                                    );
                                    let event = StreamEvent::Error {
                                        detail: e.to_string(),
                                    };
                                    return Some((event, RelayState::Finished));
                                }
                            }
                        }
                        RelayState::Streaming {
                            mut upstream,
                            mut finish_reason,
                            deltas,
                        } => match upstream.next().await {
                            Some(Ok(fragment)) => {
                                if fragment.finish_reason.is_some() {
                                    finish_reason = fragment.finish_reason;
                                }
                                match fragment.delta.filter(|d| !d.is_empty()) {
                                    Some(delta) => {
                                        let next = RelayState::Streaming {
                                            upstream,
                                            finish_reason,
                                            deltas: deltas + 1,
                                        };
                                        return Some((StreamEvent::Delta { delta }, next));
                                    }
                                    None => RelayState::Streaming {
                                        upstream,
                                        finish_reason,
                                        deltas,
                                    },
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(
                                    provider = %provider_id,
                                    model = %model,
                                    deltas_sent = deltas,
                                    error = %e,
                                    "Upstream stream failed mid-response"
                                );
                                let event = StreamEvent::Error {
                                    detail: e.to_string(),
                                };
                                return Some((event, RelayState::Finished));
                            }
                            None => {
                                tracing::debug!(
                                    provider = %provider_id,
                                    model = %model,
                                    deltas_sent = deltas,
                                    finish_reason = ?finish_reason,
                                    "Upstream stream completed"
                                );
                                let event = StreamEvent::Done {
                                    provider: provider_id,
                                    model,
                                    finish_reason,
                                };
                                return Some((event, RelayState::Finished));
                            }
                        },
                        RelayState::Finished => return None,
                    };
                }
            }
        },
    )
}
