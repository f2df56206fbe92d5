//! Upstream provider errors

use thiserror::Error;

/// Failures raised while calling the completion provider or reading its stream
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The credential was absent at startup; surfaced on first use
    #[error("Provider API key is not configured (set the {env_var} environment variable)")]
    MissingApiKey { env_var: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode stream event: {0}")]
    Decode(String),

    /// Transport or protocol failure while iterating the stream
    #[error("Upstream stream failed: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Short label for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingApiKey { .. } => "missing_api_key",
            Self::ClientInit(_) => "client_init",
            Self::Transport { .. } => "transport",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
            Self::Stream(_) => "stream",
        }
    }
}
