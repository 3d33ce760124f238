//! Request preparation shared by the completion and streaming handlers
//!
//! Both endpoints validate the body, choose a provider and resolve the model
//! the same way; only what happens after the upstream call differs.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::handlers::chat::ChatRequest;
use crate::metrics::{Endpoint, Rejection};
use crate::middleware::RequestId;
use crate::providers::{ChatProvider, Prompt, resolve_model};
use std::sync::Arc;

/// A validated request bound to exactly one provider and model
pub struct Dispatch {
    pub provider: Arc<dyn ChatProvider>,
    pub prompt: Prompt,
}

/// Validate, select a provider and resolve the model
///
/// `request` is the extractor result, so body validation failures are
/// counted here alongside selection failures.
pub fn prepare(
    state: &AppState,
    request: AppResult<ChatRequest>,
    endpoint: Endpoint,
    request_id: RequestId,
) -> AppResult<Dispatch> {
    let request = request.inspect_err(|e| {
        tracing::info!(
            request_id = %request_id,
            endpoint = endpoint.as_str(),
            error = %e,
            "Rejected invalid request"
        );
        state
            .metrics()
            .record_rejection(endpoint, Rejection::InvalidRequest);
    })?;

    let provider = state.providers().select(request.provider()).map_err(|e| {
        tracing::warn!(
            request_id = %request_id,
            endpoint = endpoint.as_str(),
            requested_provider = ?request.provider(),
            configured = ?state.providers().configured(),
            error = %e,
            "No provider available for request"
        );
        state
            .metrics()
            .record_rejection(endpoint, Rejection::ProviderUnavailable);
        AppError::from(e)
    })?;

    let model = resolve_model(request.model(), provider.default_model());

    tracing::debug!(
        request_id = %request_id,
        endpoint = endpoint.as_str(),
        provider = %provider.id(),
        model = %model,
        message_length = request.message().len(),
        "Provider selected"
    );

    Ok(Dispatch {
        prompt: Prompt::new(request.message(), model),
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::MESSAGE_REQUIRED;
    use crate::providers::ProviderId;

    fn state_with(vars: &'static [(&'static str, &'static str)]) -> AppState {
        let mut config = Config::default();
        config.apply_env(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        });
        AppState::new(config).unwrap()
    }

    fn request(json: &str) -> AppResult<ChatRequest> {
        Ok(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_prepare_resolves_default_model() {
        let state = state_with(&[("GEMINI_API_KEY", "gm-test")]);
        let dispatch = prepare(
            &state,
            request(r#"{"message":"Hi"}"#),
            Endpoint::Chat,
            RequestId::new(),
        )
        .unwrap();

        assert_eq!(dispatch.provider.id(), ProviderId::Gemini);
        assert_eq!(dispatch.prompt.model(), "gemini-2.5-flash");
        assert_eq!(dispatch.prompt.message(), "Hi");
    }

    #[test]
    fn test_prepare_prefers_model_override() {
        let state = state_with(&[("OPENAI_API_KEY", "sk-test")]);
        let dispatch = prepare(
            &state,
            request(r#"{"message":"Hi","model":"gpt-4o"}"#),
            Endpoint::Stream,
            RequestId::new(),
        )
        .unwrap();

        assert_eq!(dispatch.provider.id(), ProviderId::OpenAi);
        assert_eq!(dispatch.prompt.model(), "gpt-4o");
    }

    #[test]
    fn test_prepare_counts_invalid_requests() {
        let state = state_with(&[("OPENAI_API_KEY", "sk-test")]);
        let result = prepare(
            &state,
            Err(AppError::InvalidRequest(MESSAGE_REQUIRED.to_string())),
            Endpoint::Chat,
            RequestId::new(),
        );

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(
            state
                .metrics()
                .rejection_count(Endpoint::Chat, Rejection::InvalidRequest),
            1
        );
    }

    #[test]
    fn test_prepare_rejects_unconfigured_provider() {
        let state = state_with(&[("OPENAI_API_KEY", "sk-test")]);
        let result = prepare(
            &state,
            request(r#"{"message":"Hi","provider":"gemini"}"#),
            Endpoint::Stream,
            RequestId::new(),
        );

        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
        assert_eq!(
            state
                .metrics()
                .rejection_count(Endpoint::Stream, Rejection::ProviderUnavailable),
            1
        );
    }
}
