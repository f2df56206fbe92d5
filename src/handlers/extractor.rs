//! JSON body extractor that rejects with [`AppError`]
//!
//! Unlike `axum::Json`, the body is decoded regardless of the
//! `Content-Type` header, and every rejection (unreadable body, invalid
//! JSON, wrong shape) becomes [`AppError::RequestDecoding`], which renders
//! as the uniform `500 {"error": ...}` failure response.

use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

/// Decoded JSON request body
///
/// # Example
///
/// ```ignore
/// pub async fn handler(RelayJson(request): RelayJson<ChatRequest>) -> Result<Response, AppError> {
///     // Decoding failures never reach this point
/// }
/// ```
pub struct RelayJson<T>(pub T);

impl<S, T> FromRequest<S> for RelayJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::RequestDecoding(rejection.body_text()))?;

        serde_json::from_slice(&body)
            .map(RelayJson)
            .map_err(|e| AppError::RequestDecoding(e.to_string()))
    }
}
