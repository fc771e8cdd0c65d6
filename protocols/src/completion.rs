use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::Usage;

// ============================================================================
// Completions API (v1/completions) - legacy but still supported
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionRequest {
    /// ID of the model to use (echoed back; the backend bot is fixed)
    pub model: String,

    /// The prompt to generate a completion for
    pub prompt: String,

    /// Whether to stream back partial progress
    #[serde(default)]
    pub stream: bool,

    /// Additional OpenAI fields accepted but not forwarded
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

// ============================================================================
// Response Types
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String, // "text_completion"
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
    pub system_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub text: String,
    /// Always null; present for OpenAI client compatibility
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

/// Legacy streaming chunk: the text rides directly on the choice,
/// no `delta` wrapper, and the finishing chunk carries an empty string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionChunk {
    pub id: String,
    pub object: String, // "text_completion"
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChunkChoice>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionChunkChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<String>,
}
