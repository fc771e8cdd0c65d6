use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::Usage;

// ============================================================================
// Chat Completions API (v1/chat/completions)
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// ID of the model to use (echoed back; the backend bot is fixed)
    pub model: String,

    /// The conversation so far, oldest first
    pub messages: Vec<ChatMessage>,

    /// Whether to stream back partial progress
    #[serde(default)]
    pub stream: bool,

    /// Additional OpenAI fields (temperature, max_tokens, ...) accepted
    /// for client compatibility but not forwarded to the backend
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Message content: either a plain string or a list of content parts
/// (the OpenAI vision shape).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The plain-string form, if this is not a parts list.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Parts(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    /// Remote URL or base64 data URI
    pub url: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String, // "chat.completion"
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
    pub system_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatResponseMessage,
    /// Always null; present for OpenAI client compatibility
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>, // "stop"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponseMessage {
    pub role: String, // "assistant"
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String, // "chat.completion.chunk"
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// Streaming delta; serializes as `{}` when empty (the finishing chunk).
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatDelta {
    pub content: Option<String>,
}
