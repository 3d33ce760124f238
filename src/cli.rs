//! Command-line interface for the chat relay
//!
//! Provides argument parsing and subcommand handling for the `chat-relay` binary.

use clap::{Parser, Subcommand};

/// HTTP relay for OpenAI and Gemini chat completions
#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(version)]
#[command(about = "HTTP relay for OpenAI and Gemini chat completions")]
#[command(
    long_about = "chat-relay forwards chat messages to OpenAI or Gemini and returns the reply \
    as JSON or as a Server-Sent Events stream. Provider credentials are read from \
    OPENAI_API_KEY / GEMINI_API_KEY at startup."
)]
pub struct Cli {
    /// Path to configuration file (defaults to ./chat-relay.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chat-relay configuration
#
# Every section is optional. Environment variables override the values below:
#
#   OPENAI_API_KEY, OPENAI_MODEL, OPENAI_BASE_URL
#   GEMINI_API_KEY, GEMINI_MODEL, GEMINI_BASE_URL
#
# A provider is enabled only when its API key is set. Prefer the environment
# for keys so they stay out of version control.

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 5000

# Requests without an explicit "provider" use Gemini when configured,
# otherwise OpenAI.

[openai]
model = "gpt-4o-mini"
# Any OpenAI-compatible endpoint works here
base_url = "https://api.openai.com/v1"

[gemini]
model = "gemini-2.5-flash"
base_url = "https://generativelanguage.googleapis.com"

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
# "text" or "json"
log_format = "text"
"#
}
