//! HTTP request handlers for the chat relay API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::providers::ProviderSet;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod chat;
pub mod health;
pub mod metrics;
pub mod stream;

/// Application state shared across all handlers
///
/// Everything inside is immutable or internally synchronised, so cloning per
/// request is cheap.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    providers: ProviderSet,
    metrics: Metrics,
}

impl AppState {
    /// Create state from configuration, building an adapter for every
    /// provider whose API key is set
    pub fn new(config: Config) -> AppResult<Self> {
        let providers = ProviderSet::from_config(&config)?;
        Self::with_providers(config, providers)
    }

    /// Create state around an explicit provider set
    pub fn with_providers(config: Config, providers: ProviderSet) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            providers,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::handler))
        .route("/api/stream", post(stream::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
