//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use crate::config::LogFormat;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("chat_relay={},tower_http=debug", level)
}

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Examples
///
/// ```no_run
/// chat_relay::telemetry::init("info", chat_relay::config::LogFormat::Text);
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str, format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        let registry = tracing_subscriber::registry().with(filter);
        match format {
            LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .init(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_valid_directive() {
        let directive = default_filter("debug");
        assert_eq!(directive, "chat_relay=debug,tower_http=debug");
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
