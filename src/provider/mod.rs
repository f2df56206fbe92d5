//! Upstream completion provider
//!
//! The relay only needs one capability from a provider: start a streaming
//! chat completion and hand back an ordered, finite stream of chunks.
//! [`OpenAiProvider`] is the production implementation; tests plug in
//! scripted providers through the same trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub mod error;
pub mod openai;
pub mod types;

pub use error::ProviderError;
pub use openai::OpenAiProvider;
pub use types::{CompletionChunk, CompletionRequest, ConversationMessage, Role};

/// Ordered stream of chunks, ended by exhaustion or by an `Err` item
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, ProviderError>> + Send>>;

/// Capability to start a streaming chat completion
///
/// Implementations hold only read-only configuration (credentials, base
/// URL) and are shared across concurrent requests behind an `Arc`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs and the health endpoint
    fn name(&self) -> &str;

    /// Start a completion with streaming enabled
    ///
    /// Errors returned here happen before any chunk was produced (bad
    /// credentials, unknown model, rate limit). Failures after that point
    /// are delivered as `Err` items on the returned stream.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, ProviderError>;
}
