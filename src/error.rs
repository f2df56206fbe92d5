//! Error types for chat-relay
//!
//! All errors implement `IntoResponse` for Axum handlers. Every failure that
//! happens before the outbound stream is opened is rendered the same way:
//! HTTP 500 with a JSON body of the form `{"error": "<message>"}`.

use crate::provider::ProviderError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Message used when an error renders to an empty string
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    /// Request body is not JSON or does not have the expected shape
    #[error("Invalid request body: {0}")]
    RequestDecoding(String),

    /// Provider rejected the call or failed before the first chunk
    #[error("{0}")]
    Upstream(#[from] ProviderError),

    #[error("Request exceeded the {timeout_seconds}s deadline before streaming started")]
    DeadlineExceeded { timeout_seconds: u64 },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Message placed in the `error` field of the JSON failure body
    pub fn client_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Client- and provider-caused failures share one status code.
        let body = Json(serde_json::json!({
            "error": self.client_message(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
