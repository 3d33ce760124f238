//! chat-relay HTTP server
//!
//! Starts an Axum web server that relays chat messages to OpenAI or Gemini.

use chat_relay::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use clap::Parser;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Credentials are read once here and never reloaded
    let config = Config::load(cli.config.as_deref().map(Path::new))?;

    telemetry::init(
        &config.observability.log_level,
        config.observability.log_format,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(config)?;
    if state.providers().configured().is_empty() {
        tracing::warn!(
            "No provider API key configured (OPENAI_API_KEY / GEMINI_API_KEY); \
            every chat request will fail with 500"
        );
    }

    let app = handlers::router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
