//! Provider selection policy
//!
//! An explicit provider request is honoured or rejected, never substituted.
//! Without one, Gemini is preferred over OpenAI.

use super::ProviderId;
use thiserror::Error;

/// Default-request preference order
const DEFAULT_PREFERENCE: [ProviderId; 2] = [ProviderId::Gemini, ProviderId::OpenAi];

/// Why no provider could be chosen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The caller named a provider that is unknown or has no credentials
    #[error("requested provider '{0}' is not configured")]
    RequestedUnavailable(String),

    /// No provider was named and none has credentials
    #[error("no provider has credentials configured")]
    NoneConfigured,
}

/// Resolve exactly one provider for a request
///
/// `requested` is the raw `provider` field from the request; blank values
/// count as absent. `is_configured` reports whether credentials exist.
pub fn select_provider(
    requested: Option<&str>,
    is_configured: impl Fn(ProviderId) -> bool,
) -> Result<ProviderId, SelectionError> {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => match name.parse::<ProviderId>() {
            Ok(id) if is_configured(id) => Ok(id),
            _ => Err(SelectionError::RequestedUnavailable(name.to_string())),
        },
        None => DEFAULT_PREFERENCE
            .into_iter()
            .find(|id| is_configured(*id))
            .ok_or(SelectionError::NoneConfigured),
    }
}
