//! chat-relay - HTTP relay for OpenAI and Gemini chat completions
//!
//! Forwards a single user message to one of two LLM providers and returns the
//! reply as one JSON object or as a Server-Sent Events stream of text deltas.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod relay;
pub mod shared;
pub mod telemetry;
