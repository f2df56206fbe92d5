//! Chat endpoint handler
//!
//! Handles POST /api/chat: forwards the conversation to the upstream
//! provider and streams the reply back as plain text.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::extractor::RelayJson;
use crate::metrics::{FailureStage, Outcome};
use crate::middleware::{ReceivedAt, RequestId};
use crate::provider::ConversationMessage;
use crate::relay::{self, RelayOptions, RelayOutcome};
use axum::{
    Extension,
    body::Body,
    extract::{FromRequest, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Content type of a successful (streamed) reply
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Chat request from client
///
/// Only the shape is checked; message contents and ordering go to the
/// provider as received.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    messages: Vec<ConversationMessage>,
    /// Opaque chat identifier, logged and otherwise ignored
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl ChatRequest {
    /// Get the messages
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Get the opaque chat identifier
    pub fn id(&self) -> Option<&serde_json::Value> {
        self.id.as_ref()
    }

    /// Chat identifier rendered for logs (`-` when absent)
    pub fn id_label(&self) -> String {
        match &self.id {
            None | Some(serde_json::Value::Null) => "-".to_string(),
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Consume the request, keeping only the messages
    pub fn into_messages(self) -> Vec<ConversationMessage> {
        self.messages
    }
}

/// POST /api/chat handler
///
/// # Lifecycle
///
/// `Received -> AwaitingUpstream -> Streaming -> {Closed | Failed}`
///
/// - Failures before streaming (bad body, provider rejection, deadline)
///   return `500 {"error": ...}`.
/// - Once the provider accepts the call, a 200 `text/plain` response is
///   returned immediately and the body grows as fragments arrive.
/// - A failure while streaming ends the body with an error, aborting the
///   chunked response.
///
/// The whole lifecycle, reading the request body included, is bounded by
/// `server.request_timeout_seconds` measured from [`ReceivedAt`].
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(received_at): Extension<ReceivedAt>,
    request: Request,
) -> Result<Response, AppError> {
    let started = received_at.instant();
    let timeout = state.config().request_timeout();
    let deadline = started + timeout;

    let decoded =
        tokio::time::timeout_at(deadline, RelayJson::<ChatRequest>::from_request(request, &state))
            .await;

    let RelayJson(request) = match decoded {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                "Rejected chat request: body could not be decoded"
            );
            state
                .metrics()
                .record_outcome(Outcome::Rejected, started.elapsed());
            return Err(e);
        }
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                timeout_seconds = timeout.as_secs(),
                "Request body was not received before the request deadline"
            );
            state
                .metrics()
                .record_outcome(Outcome::DeadlineExceeded, started.elapsed());
            return Err(AppError::DeadlineExceeded {
                timeout_seconds: timeout.as_secs(),
            });
        }
    };

    let chat_id = request.id_label();
    tracing::info!(
        request_id = %request_id,
        chat_id = %chat_id,
        messages_count = request.messages().len(),
        messages = ?request.messages(),
        "Received chat request"
    );

    let completion = state.completion_request(request.into_messages());
    let provider = state.provider().clone();

    let upstream =
        match tokio::time::timeout_at(deadline, provider.stream_completion(completion)).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                tracing::error!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    provider = %provider.name(),
                    error_kind = e.kind(),
                    error = %e,
                    "Upstream provider call failed"
                );
                state.metrics().upstream_failure(FailureStage::Open);
                state
                    .metrics()
                    .record_outcome(Outcome::UpstreamFailed, started.elapsed());
                return Err(AppError::Upstream(e));
            }
            Err(_) => {
                tracing::error!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    timeout_seconds = timeout.as_secs(),
                    "Upstream provider did not answer before the request deadline"
                );
                state
                    .metrics()
                    .record_outcome(Outcome::DeadlineExceeded, started.elapsed());
                return Err(AppError::DeadlineExceeded {
                    timeout_seconds: timeout.as_secs(),
                });
            }
        };

    tracing::debug!(
        request_id = %request_id,
        chat_id = %chat_id,
        "Upstream stream opened, relaying"
    );

    let metrics = state.metrics().clone();
    let options = RelayOptions::new(state.config().relay.channel_capacity, deadline);
    let body = relay::spawn(upstream, options, move |outcome| {
        let stats = outcome.stats();
        metrics.record_relayed(stats.fragments, stats.bytes);

        let recorded = match &outcome {
            RelayOutcome::Completed(_) => {
                tracing::info!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    fragments_relayed = stats.fragments,
                    bytes_relayed = stats.bytes,
                    "Chat stream completed"
                );
                Outcome::Completed
            }
            RelayOutcome::UpstreamFailed { error, .. } => {
                tracing::error!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    fragments_relayed = stats.fragments,
                    bytes_relayed = stats.bytes,
                    error_kind = error.kind(),
                    error = %error,
                    "Upstream stream failed mid-response; reply truncated"
                );
                metrics.upstream_failure(FailureStage::MidStream);
                Outcome::UpstreamFailed
            }
            RelayOutcome::DeadlineExceeded(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    bytes_relayed = stats.bytes,
                    "Request deadline exceeded while streaming; reply truncated"
                );
                Outcome::DeadlineExceeded
            }
            RelayOutcome::ClientDisconnected(_) => {
                tracing::info!(
                    request_id = %request_id,
                    chat_id = %chat_id,
                    bytes_relayed = stats.bytes,
                    "Client disconnected; upstream stream cancelled"
                );
                Outcome::ClientDisconnected
            }
        };
        metrics.record_outcome(recorded, started.elapsed());
    });

    Ok((
        [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)],
        Body::from_stream(body),
    )
        .into_response())
}
