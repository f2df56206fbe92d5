//! OpenAI-compatible streaming chat completions client
//!
//! Sends `POST {base_url}/chat/completions` with `stream: true` and decodes
//! the Server-Sent Events body into [`CompletionChunk`]s.
//!
//! # Wire Format
//!
//! ```text
//! data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"role":"assistant"}}]}
//!
//! data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hello"}}]}
//!
//! data: [DONE]
//!
//! ```

use super::types::{CompletionChunk, CompletionRequest, ConversationMessage};
use super::{ChunkStream, CompletionProvider, ProviderError};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, future};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel event that ends an OpenAI stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest provider payload echoed back in error messages (characters)
const ERROR_PREVIEW_CHARS: usize = 500;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    temperature: f64,
    stream: bool,
}

/// OpenAI error envelope: `{"error": {"message": "...", "type": "..."}}`
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// A stream event is either a chunk or an in-band error object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Failure { error: ApiErrorBody },
    Chunk(CompletionChunk),
}

/// Streaming client for OpenAI-compatible chat completion APIs
///
/// Built once at startup and shared read-only; holds no per-request state.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with an explicit credential
    ///
    /// A missing key is accepted here; it is reported when the first
    /// completion is attempted.
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ProviderError::ClientInit)?;

        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: config.api_key_env().to_string(),
        })
    }

    /// Create a provider reading the credential from `config.api_key_env()`
    pub fn from_env(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(config.api_key_env()).ok();
        if api_key.is_none() {
            tracing::warn!(
                env_var = %config.api_key_env(),
                "Provider API key is not set; chat requests will fail until it is configured"
            );
        }
        Self::new(config, api_key)
    }

    /// Full URL of the chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Whether a credential was supplied
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            })?;

        let url = self.completions_url();
        let body = ChatCompletionsBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: true,
        };

        tracing::debug!(
            endpoint = %url,
            model = %request.model,
            messages_count = request.messages.len(),
            temperature = request.temperature,
            "Starting streaming chat completion"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = api_error(status, &body);
            tracing::warn!(
                endpoint = %url,
                status = status.as_u16(),
                error = %error,
                "Provider rejected chat completion"
            );
            return Err(error);
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Decode an SSE byte stream into completion chunks
///
/// Stops at the `[DONE]` sentinel or when the body ends. Transport errors and
/// undecodable events become `Err` items.
pub fn decode_event_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let chunks = body
        .eventsource()
        .take_while(|event| {
            future::ready(!matches!(event, Ok(event) if event.data.trim() == DONE_SENTINEL))
        })
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => decode_event(&event.data),
                Err(e) => Some(Err(ProviderError::Stream(e.to_string()))),
            })
        });

    Box::pin(chunks)
}

fn decode_event(data: &str) -> Option<Result<CompletionChunk, ProviderError>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    Some(match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Chunk(chunk)) => Ok(chunk),
        Ok(StreamPayload::Failure { error }) => Err(ProviderError::Stream(error.message)),
        Err(e) => Err(ProviderError::Decode(format!(
            "{} (payload: {})",
            e,
            preview(data)
        ))),
    })
}

/// Build an [`ProviderError::Api`] from a non-success response
fn api_error(status: StatusCode, body: &str) -> ProviderError {
    let message = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if !body.trim().is_empty() => preview(body.trim()),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };

    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(ERROR_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    type ByteResults = Vec<Result<Bytes, std::io::Error>>;

    fn byte_stream(parts: &[&str]) -> stream::Iter<std::vec::IntoIter<Result<Bytes, std::io::Error>>> {
        let parts: ByteResults = parts
            .iter()
            .map(|part| Ok(Bytes::from(part.to_string())))
            .collect();
        stream::iter(parts)
    }

    async fn collect_texts(parts: &[&str]) -> Vec<Result<Option<String>, String>> {
        decode_event_stream(byte_stream(parts))
            .map(|item| {
                item.map(|chunk| chunk.text_delta().map(str::to_string))
                    .map_err(|e| e.to_string())
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_decodes_content_chunks_in_order() {
        let items = collect_texts(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert_eq!(
            items,
            vec![
                Ok(None),
                Ok(Some("Hel".to_string())),
                Ok(Some("lo".to_string())),
                Ok(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_event_split_across_network_chunks() {
        let items = collect_texts(&[
            "data: {\"choices\":[{\"index\":0,\"del",
            "ta\":{\"content\":\"split\"}}]}\n",
            "\ndata: [DONE]\n\n",
        ])
        .await;

        assert_eq!(items, vec![Ok(Some("split".to_string()))]);
    }

    #[tokio::test]
    async fn test_done_sentinel_ends_stream() {
        let items = collect_texts(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"late\"}}]}\n\n",
        ])
        .await;

        assert_eq!(items, vec![Ok(Some("a".to_string()))]);
    }

    #[tokio::test]
    async fn test_stream_without_done_ends_at_body_end() {
        let items = collect_texts(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"only\"}}]}\n\n",
        ])
        .await;

        assert_eq!(items, vec![Ok(Some("only".to_string()))]);
    }

    #[tokio::test]
    async fn test_in_band_error_object_becomes_error_item() {
        let items = collect_texts(&[
            "data: {\"error\":{\"message\":\"The server had an error\",\"type\":\"server_error\"}}\n\n",
        ])
        .await;

        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(err.contains("The server had an error"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_malformed_event_becomes_decode_error() {
        let items = collect_texts(&["data: {not json\n\n"]).await;

        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(err.contains("decode"), "got: {}", err);
        assert!(err.contains("{not json"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_transport_error_becomes_stream_error() {
        let parts: ByteResults = vec![
            Ok(Bytes::from(
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\n",
            )),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];
        let items: Vec<_> = decode_event_stream(stream::iter(parts)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ProviderError::Stream(_))));
    }

    #[test]
    fn test_api_error_uses_openai_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided: sk-***","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#;
        match api_error(StatusCode::UNAUTHORIZED, body) {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided: sk-***");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        match api_error(StatusCode::BAD_GATEWAY, "upstream unavailable") {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_with_empty_body_uses_reason_phrase() {
        match api_error(StatusCode::TOO_MANY_REQUESTS, "") {
            ProviderError::Api { message, .. } => assert_eq!(message, "Too Many Requests"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(ERROR_PREVIEW_CHARS + 10);
        let short = preview(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), ERROR_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_request_body_enables_streaming() {
        let messages = vec![ConversationMessage::user("Hi")];
        let body = ChatCompletionsBody {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.7,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["stream"], true);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hi");
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let config: ProviderConfig =
            toml::from_str(r#"base_url = "http://localhost:8080/v1/""#).unwrap();
        let provider = OpenAiProvider::new(&config, Some("sk-test".to_string())).unwrap();
        assert_eq!(
            provider.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let provider = OpenAiProvider::new(&ProviderConfig::default(), Some("  ".to_string())).unwrap();
        assert!(!provider.has_api_key());
        assert!(!format!("{:?}", provider).contains("sk-"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_on_first_call() {
        let provider = OpenAiProvider::new(&ProviderConfig::default(), None).unwrap();
        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![ConversationMessage::user("Hi")],
            temperature: 0.7,
        };
        let result = provider.stream_completion(request).await;
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }
}
