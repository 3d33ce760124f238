//! Prometheus metrics for the chat relay
//!
//! Tracks:
//! - Completed requests by endpoint, provider and outcome
//! - Requests rejected before a provider was contacted
//! - Upstream latency for one-shot completions
//! - Streamed deltas per provider
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.
//! Recording never fails a request: label errors are logged and dropped.

use crate::providers::ProviderId;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Relay endpoint label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Stream,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::Stream => "stream",
        }
    }
}

/// How a request that reached a provider ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    UpstreamError,
    StreamError,
    /// Client went away before the stream reached a terminal event
    ClientDisconnected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::UpstreamError => "upstream_error",
            Outcome::StreamError => "stream_error",
            Outcome::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Why a request was refused before any upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidRequest,
    ProviderUnavailable,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidRequest => "invalid_request",
            Rejection::ProviderUnavailable => "provider_unavailable",
        }
    }
}

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    rejected_total: IntCounterVec,
    upstream_duration: HistogramVec,
    stream_deltas: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "chat_relay_requests_total",
                "Requests that reached a provider, by endpoint, provider and outcome",
            ),
            &["endpoint", "provider", "outcome"],
        )?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "chat_relay_rejected_requests_total",
                "Requests refused before contacting a provider, by endpoint and reason",
            ),
            &["endpoint", "reason"],
        )?;

        let upstream_duration = HistogramVec::new(
            HistogramOpts::new(
                "chat_relay_upstream_duration_ms",
                "Latency of one-shot upstream completions in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["provider"],
        )?;

        let stream_deltas = IntCounterVec::new(
            Opts::new(
                "chat_relay_stream_deltas_total",
                "Text deltas relayed to streaming clients, by provider",
            ),
            &["provider"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rejected_total.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(stream_deltas.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            rejected_total,
            upstream_duration,
            stream_deltas,
        })
    }

    pub fn record_request(&self, endpoint: Endpoint, provider: ProviderId, outcome: Outcome) {
        match self.requests_total.get_metric_with_label_values(&[
            endpoint.as_str(),
            provider.as_str(),
            outcome.as_str(),
        ]) {
            Ok(counter) => counter.inc(),
            Err(e) => log_recording_failure("record_request", &e),
        }
    }

    pub fn record_rejection(&self, endpoint: Endpoint, reason: Rejection) {
        match self
            .rejected_total
            .get_metric_with_label_values(&[endpoint.as_str(), reason.as_str()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => log_recording_failure("record_rejection", &e),
        }
    }

    pub fn record_upstream_duration(&self, provider: ProviderId, duration_ms: f64) {
        match self
            .upstream_duration
            .get_metric_with_label_values(&[provider.as_str()])
        {
            Ok(histogram) => histogram.observe(duration_ms),
            Err(e) => log_recording_failure("record_upstream_duration", &e),
        }
    }

    pub fn record_stream_delta(&self, provider: ProviderId) {
        match self
            .stream_deltas
            .get_metric_with_label_values(&[provider.as_str()])
        {
            Ok(counter) => counter.inc(),
            Err(e) => log_recording_failure("record_stream_delta", &e),
        }
    }

    /// Current value of `chat_relay_requests_total` for one label set
    pub fn request_count(&self, endpoint: Endpoint, provider: ProviderId, outcome: Outcome) -> u64 {
        self.requests_total
            .get_metric_with_label_values(&[endpoint.as_str(), provider.as_str(), outcome.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Current value of `chat_relay_rejected_requests_total` for one label set
    pub fn rejection_count(&self, endpoint: Endpoint, reason: Rejection) -> u64 {
        self.rejected_total
            .get_metric_with_label_values(&[endpoint.as_str(), reason.as_str()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output was not UTF-8: {}", e)))
    }
}

fn log_recording_failure(operation: &'static str, error: &prometheus::Error) {
    tracing::error!(
        operation,
        error = %error,
        "Metrics recording failed (non-fatal), request continues"
    );
}
