//! Shared helpers for integration tests
//!
//! Scripted providers stand in for the upstream API so handler behavior can
//! be checked without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use chat_relay::{
    config::Config,
    handlers::{self, AppState},
    provider::{
        ChunkStream, CompletionChunk, CompletionProvider, CompletionRequest, ProviderError,
    },
};
use futures::{StreamExt, stream};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// One scripted upstream item
#[derive(Debug, Clone)]
pub enum Step {
    /// Chunk with this text delta (may be empty)
    Text(&'static str),
    /// Role announcement chunk (no text)
    Role,
    /// Finish chunk (no text)
    Finish,
    /// Mid-stream failure
    Fail(&'static str),
    /// Never yield again
    Hang,
}

/// What the provider does when called
#[derive(Debug, Clone)]
pub enum Script {
    /// Accept the call and stream these steps
    Stream(Vec<Step>),
    /// Reject the call with an API error
    Reject { status: u16, message: &'static str },
    /// Never answer the call
    Hang,
}

/// Provider that replays a script and records every call
pub struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn streaming(steps: Vec<Step>) -> Arc<Self> {
        Self::new(Script::Stream(steps))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

fn to_stream(steps: Vec<Step>) -> ChunkStream {
    let mut items = Vec::new();
    let mut hang = false;
    for step in steps {
        match step {
            Step::Text(text) => items.push(Ok(CompletionChunk::text(text))),
            Step::Role => items.push(Ok(CompletionChunk::role_announcement())),
            Step::Finish => items.push(Ok(CompletionChunk::finish("stop"))),
            Step::Fail(message) => items.push(Err(ProviderError::Stream(message.to_string()))),
            Step::Hang => {
                hang = true;
                break;
            }
        }
    }

    if hang {
        Box::pin(stream::iter(items).chain(stream::pending()))
    } else {
        Box::pin(stream::iter(items))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        match &self.script {
            Script::Stream(steps) => Ok(to_stream(steps.clone())),
            Script::Reject { status, message } => Err(ProviderError::Api {
                status: *status,
                message: message.to_string(),
            }),
            Script::Hang => futures::future::pending().await,
        }
    }
}

/// Config with a short request deadline for timeout tests
pub fn config_with_timeout(seconds: u64) -> Config {
    Config::from_str(&format!(
        "[server]\nrequest_timeout_seconds = {}\n",
        seconds
    ))
    .expect("should parse test config")
}

/// Router wired to `provider`
pub fn create_test_app(provider: Arc<dyn CompletionProvider>, config: Config) -> (Router, AppState) {
    let state = AppState::new(Arc::new(config), provider).expect("AppState::new should succeed");
    (handlers::router(state.clone()), state)
}

/// POST /api/chat with a raw body
pub async fn post_chat(app: Router, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    app.oneshot(request).await.unwrap()
}

/// Read a whole body, failing if it ends with an error
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should complete without error");
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}

/// Read a body frame by frame, returning the bytes before any error
pub async fn body_until_error(response: Response<Body>) -> (Vec<u8>, Option<String>) {
    let mut stream = response.into_body().into_data_stream();
    let mut bytes = Vec::new();
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(data) => bytes.extend_from_slice(&data),
            Err(e) => return (bytes, Some(e.to_string())),
        }
    }
    (bytes, None)
}

/// Read a JSON error body
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Wait until `predicate` holds or panic after `limit`
pub async fn wait_for(limit: Duration, mut predicate: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !predicate() {
        assert!(start.elapsed() < limit, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
