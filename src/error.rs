//! Error types for the chat relay
//!
//! All errors implement `IntoResponse` for Axum handlers. The response bodies
//! are part of the public HTTP contract, so client-facing messages are fixed
//! strings; the underlying cause is only logged (or attached as `detail` for
//! upstream failures).

use crate::providers::{ProviderError, ProviderId, selector::SelectionError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Client-facing message for a missing or empty `message` field
pub const MESSAGE_REQUIRED: &str = "message is required";

/// Client-facing message when no provider can serve the request
pub const NO_PROVIDER_AVAILABLE: &str = "No API provider configured or available";

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config file '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(#[from] SelectionError),

    #[error("Failed to contact {}: {source}", .provider.display_name())]
    Upstream {
        provider: ProviderId,
        #[source]
        source: ProviderError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::ProviderUnavailable(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidRequest(msg) => serde_json::json!({ "error": msg }),
            // Requested-but-unconfigured and nothing-configured share one body
            Self::ProviderUnavailable(_) => serde_json::json!({ "error": NO_PROVIDER_AVAILABLE }),
            Self::Upstream { provider, source } => serde_json::json!({
                "error": format!("Failed to contact {}", provider.display_name()),
                "detail": source.to_string(),
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
