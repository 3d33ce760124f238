//! Configuration management for the chat relay
//!
//! Settings come from an optional TOML file, then provider credentials and
//! models are overridden from the environment. The resulting [`Config`] is
//! built once at startup and never mutated afterwards.

use crate::error::{AppError, AppResult};
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_PATH: &str = "chat-relay.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openai: ProviderSection,
    #[serde(default)]
    pub gemini: ProviderSection,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

/// Raw `[openai]` / `[gemini]` table
///
/// Every field is optional; vendor defaults are applied when the section is
/// resolved through [`Config::credentials`]. The API key is normally supplied
/// through the environment rather than the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
}

/// Fully resolved settings for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    id: ProviderId,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl ProviderCredentials {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// API key, or `None` when the provider is not configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Default model for requests that do not name one
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Empty and whitespace-only values count as unset
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Build the process configuration
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
    /// used if present, otherwise built-in defaults. Environment variables
    /// are applied last.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override provider settings from `<PREFIX>_API_KEY`, `<PREFIX>_MODEL`
    /// and `<PREFIX>_BASE_URL`
    ///
    /// `lookup` abstracts `std::env::var` so tests can supply a fixed map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in ProviderId::ALL {
            let prefix = id.env_prefix();
            let section = self.section_mut(id);

            if let Some(key) = non_blank(lookup(&format!("{prefix}_API_KEY")).as_deref()) {
                section.api_key = Some(key);
            }
            if let Some(model) = non_blank(lookup(&format!("{prefix}_MODEL")).as_deref()) {
                section.model = Some(model);
            }
            if let Some(url) = non_blank(lookup(&format!("{prefix}_BASE_URL")).as_deref()) {
                section.base_url = Some(url);
            }
        }
    }

    fn section(&self, id: ProviderId) -> &ProviderSection {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Gemini => &self.gemini,
        }
    }

    fn section_mut(&mut self, id: ProviderId) -> &mut ProviderSection {
        match id {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Gemini => &mut self.gemini,
        }
    }

    /// Resolve a provider section, filling vendor defaults
    pub fn credentials(&self, id: ProviderId) -> ProviderCredentials {
        let section = self.section(id);
        ProviderCredentials {
            id,
            api_key: non_blank(section.api_key.as_deref()),
            model: non_blank(section.model.as_deref())
                .unwrap_or_else(|| id.default_model().to_string()),
            base_url: non_blank(section.base_url.as_deref())
                .unwrap_or_else(|| id.default_base_url().to_string()),
        }
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(AppError::Config("server.host cannot be empty".to_string()));
        }

        for id in ProviderId::ALL {
            let credentials = self.credentials(id);
            let base_url = credentials.base_url();
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{}.base_url '{}' must start with 'http://' or 'https://'",
                    id, base_url
                )));
            }
        }

        if tracing_subscriber::EnvFilter::try_new(&self.observability.log_level).is_err() {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' is not a valid log filter",
                self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
