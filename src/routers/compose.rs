//! Request composition: turning an OpenAI-style request into the single
//! free-text query (plus optional images) that Dify accepts.

use openai_compat::chat::{ChatMessage, ContentPart, MessageContent};
use serde_json::{Map, Value};

use crate::{
    config::BotType,
    dify::client::{DifyRequest, ImageDescriptor},
};

/// The query derived from an incoming request, fixed before the backend
/// call is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    pub query: String,
    pub images: Vec<ImageDescriptor>,
}

/// Compose the query for a chat request from its message list.
///
/// Returns `None` for an empty message list (rejected upstream as a
/// 400, never sent to the backend).
pub fn compose_chat_query(messages: &[ChatMessage], bot_type: BotType) -> Option<ComposedQuery> {
    let last = messages.last()?;

    let mut query = String::new();
    let mut images = Vec::new();

    match &last.content {
        MessageContent::Parts(parts) => {
            let mut text_seen = false;
            for part in parts {
                match part {
                    ContentPart::Text { text } => {
                        // First text part wins
                        if !text_seen {
                            query = text.clone();
                            text_seen = true;
                        }
                    }
                    ContentPart::ImageUrl { image_url } => {
                        // Remote URLs are skipped, not errored
                        if let Some(data) = base64_image_payload(&image_url.url) {
                            images.push(ImageDescriptor::base64(data));
                        }
                    }
                }
            }
        }
        MessageContent::Text(text) => query = text.clone(),
    }

    // Chat mode flattens prior turns into the query, but only when the
    // final message is plain text. With image parts the history is
    // dropped and only the extracted text is sent.
    if bot_type == BotType::Chat {
        if let Some(question) = last.content.as_text() {
            query = flatten_history(messages, question);
        }
    }

    Some(ComposedQuery { query, images })
}

/// Compose the query for a legacy completion request: the prompt
/// verbatim, no images, no history.
pub fn compose_completion_query(prompt: &str) -> ComposedQuery {
    ComposedQuery {
        query: prompt.to_string(),
        images: Vec::new(),
    }
}

/// Build the backend payload from a composed query.
pub fn build_dify_request(
    composed: ComposedQuery,
    stream: bool,
    input_variable: Option<&str>,
) -> DifyRequest {
    let (inputs, query) = match input_variable {
        Some(name) => {
            let mut inputs = Map::new();
            inputs.insert(name.to_string(), Value::String(composed.query));
            (inputs, None)
        }
        None => (Map::new(), Some(composed.query)),
    };

    DifyRequest {
        inputs,
        query,
        response_mode: if stream { "streaming" } else { "blocking" },
        conversation_id: String::new(),
        user: "apiuser",
        auto_generate_name: false,
        files: composed.images,
    }
}

/// Transcript of all prior messages plus the final question, in the
/// fixed template the backend prompt expects. The backend is stateless
/// per call, so conversational context travels inside the query itself.
fn flatten_history(messages: &[ChatMessage], question: &str) -> String {
    let history = messages[..messages.len() - 1]
        .iter()
        .map(|message| {
            format!(
                "{}: {}",
                message.role,
                message.content.as_text().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "here is our talk history:\n'''\n{}\n'''\n\nhere is my question:\n{}",
        history, question
    )
}

/// The base64 payload of a `data:image/*` URI, or `None` for anything
/// else (http/https URLs included).
fn base64_image_payload(url: &str) -> Option<&str> {
    if !url.starts_with("data:image") {
        return None;
    }
    match url.split_once(',') {
        Some((_, data)) if !data.is_empty() => Some(data),
        _ => None,
    }
}
