//! chat-relay - streams chat completions from an OpenAI-compatible provider
//!
//! A single `POST /api/chat` endpoint forwards the caller's conversation to
//! the upstream provider with streaming enabled and relays each text
//! fragment back, in order, as a plain-text response body.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod relay;
pub mod telemetry;
