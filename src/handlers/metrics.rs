//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if encoding fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:5000/metrics
/// # HELP chat_relay_requests_total Requests that reached a provider, by endpoint, provider and outcome
/// # TYPE chat_relay_requests_total counter
/// chat_relay_requests_total{endpoint="chat",outcome="success",provider="gemini"} 42
/// ```
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics for scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
        }
    }
}
