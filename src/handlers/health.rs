//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;
use crate::providers::ProviderId;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Providers with credentials configured
    pub providers: Vec<ProviderId>,
}

/// Health check handler
///
/// Always 200: a relay with no providers is still alive, it just answers
/// every chat request with 500.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            providers: state.providers().configured(),
        }),
    )
}
