//! Health check endpoint
//!
//! Provides a simple liveness check for monitoring and load balancers.
//! The upstream provider is not contacted.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Upstream provider name
    pub provider: String,
    /// Model requested for every completion
    pub model: String,
}

/// Health check handler
///
/// Always returns 200 OK while the process is serving requests.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            provider: state.provider().name().to_string(),
            model: state.config().provider.model().to_string(),
        }),
    )
}
