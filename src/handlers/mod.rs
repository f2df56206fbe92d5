//! HTTP request handlers for chat-relay

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::{received_at_middleware, request_id_middleware};
use crate::provider::{CompletionProvider, CompletionRequest, ConversationMessage, OpenAiProvider};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod extractor;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// Contains configuration, the upstream provider and metrics.
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn CompletionProvider>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState around an already-built provider
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration fails.
    pub fn new(config: Arc<Config>, provider: Arc<dyn CompletionProvider>) -> AppResult<Self> {
        let metrics = Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {}", e))
        })?;

        Ok(Self {
            config,
            provider,
            metrics: Arc::new(metrics),
        })
    }

    /// Create a new AppState with the OpenAI provider described by `config`
    ///
    /// The API key is read from the environment once, here.
    pub fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let provider = OpenAiProvider::from_env(&config.provider)?;
        Self::new(config, Arc::new(provider))
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the upstream provider
    pub fn provider(&self) -> &Arc<dyn CompletionProvider> {
        &self.provider
    }

    /// Get reference to the metrics collector
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Build the provider call for `messages` using the configured model
    pub fn completion_request(&self, messages: Vec<ConversationMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.config.provider.model().to_string(),
            messages,
            temperature: self.config.provider.temperature(),
        }
    }
}

/// Build the application router with all routes and middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(received_at_middleware))
        .layer(TraceLayer::new_for_http())
}
