//! Request receipt timestamp
//!
//! Stamps each request with the instant it entered the service so the chat
//! deadline also covers reading the request body.

use axum::{extract::Request, middleware::Next, response::Response};
use tokio::time::Instant;

/// When the request was received, stored as an Axum extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedAt(pub Instant);

impl ReceivedAt {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn instant(&self) -> Instant {
        self.0
    }
}

/// Middleware inserting [`ReceivedAt`] before any extractor runs
pub async fn received_at_middleware(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(ReceivedAt::now());
    next.run(request).await
}
