//! Conversation and streaming chunk types
//!
//! `ConversationMessage` is decoded from the caller and forwarded to the
//! provider untouched. `CompletionChunk` mirrors the OpenAI
//! `chat.completion.chunk` object; only the first choice's text delta is
//! ever consumed.

use serde::{Deserialize, Serialize};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation
///
/// No content validation: empty or oddly ordered messages are the provider's
/// problem to reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Parameters for one streaming completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub temperature: f64,
}

/// One unit of the provider's streaming response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// Chunk carrying a text fragment
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: Some(ChunkDelta {
                    role: None,
                    content: Some(content.into()),
                }),
                finish_reason: None,
            }],
        }
    }

    /// Opening chunk that only announces the assistant role
    pub fn role_announcement() -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: Some(ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: None,
                }),
                finish_reason: None,
            }],
        }
    }

    /// Closing chunk with an empty delta and a finish reason
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            id: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: Some(ChunkDelta::default()),
                finish_reason: Some(reason.into()),
            }],
        }
    }

    /// Text delta of the first choice, if present and non-empty
    pub fn text_delta(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}
