//! Streaming Response Translator.
//!
//! Consumes demultiplexed backend events and emits OpenAI-compatible
//! SSE chunks. A two-state machine (`Streaming` → `Terminated`)
//! guarantees that exactly one terminal sequence — a `finish_reason:
//! "stop"` chunk followed by the literal `[DONE]` frame — reaches the
//! client, no matter how many terminal-looking events the backend sends.

use std::{collections::VecDeque, fmt::Display, io};

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use openai_compat::{
    chat::{ChatChunkChoice, ChatCompletionChunk, ChatDelta},
    common::object_types,
    completion::{CompletionChunk, CompletionChunkChoice},
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};

use super::{value_to_string, OutputShape};
use crate::dify::event::{DifyEvent, EventParser};

/// Channel buffer size for SSE frames sent to the client.
const SSE_CHANNEL_SIZE: usize = 128;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Terminated,
}

/// Per-request translator from backend events to outgoing SSE frames.
pub struct StreamTranslator {
    shape: OutputShape,
    model: String,
    output_variable: Option<String>,
    state: StreamState,
    awaiting_first_delta: bool,
}

impl StreamTranslator {
    pub fn new(shape: OutputShape, model: String, output_variable: Option<String>) -> Self {
        Self {
            shape,
            model,
            output_variable,
            state: StreamState::Streaming,
            awaiting_first_delta: true,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == StreamState::Terminated
    }

    /// Translate one backend event into zero or more SSE frames.
    /// Once terminated, every further event yields nothing.
    pub fn handle(&mut self, event: &DifyEvent) -> Vec<Bytes> {
        if self.is_terminated() {
            return Vec::new();
        }
        match event {
            DifyEvent::Message { answer, created_at }
            | DifyEvent::AgentMessage { answer, created_at } => {
                let content = self.extract_answer(answer);
                self.content_frames(content, *created_at)
            }
            DifyEvent::TextChunk { data, created_at } => {
                self.content_frames(data.text.clone(), *created_at)
            }
            DifyEvent::MessageEnd { created_at, .. }
            | DifyEvent::WorkflowFinished { created_at, .. } => self.finish_frames(*created_at),
            DifyEvent::Error { code, message } => {
                error!(code = %code, message = %message, "Backend signaled an error mid-stream");
                self.error_frames(message)
            }
            DifyEvent::AgentThought | DifyEvent::Ping | DifyEvent::Unknown => Vec::new(),
        }
    }

    /// Textual delta for a message-style event: a configured output
    /// variable selects from a keyed answer, otherwise the raw answer.
    fn extract_answer(&self, answer: &Value) -> String {
        if let (Some(key), Value::Object(map)) = (self.output_variable.as_deref(), answer) {
            map.get(key).map(value_to_string).unwrap_or_default()
        } else {
            value_to_string(answer)
        }
    }

    fn content_frames(&mut self, mut content: String, created_at: Option<i64>) -> Vec<Bytes> {
        // Leading whitespace is stripped once, on the first non-empty
        // delta of the whole response.
        if self.awaiting_first_delta && !content.is_empty() {
            content = content.trim_start().to_string();
            self.awaiting_first_delta = false;
        }
        if content.is_empty() {
            return Vec::new();
        }
        vec![self.chunk_frame(Some(content), None, created_at)]
    }

    fn finish_frames(&mut self, created_at: Option<i64>) -> Vec<Bytes> {
        self.state = StreamState::Terminated;
        vec![
            self.chunk_frame(None, Some("stop".to_string()), created_at),
            Bytes::from_static(DONE_FRAME),
        ]
    }

    fn error_frames(&mut self, message: &str) -> Vec<Bytes> {
        self.state = StreamState::Terminated;
        vec![
            sse_frame(&json!({ "error": message })),
            Bytes::from_static(DONE_FRAME),
        ]
    }

    /// One outgoing chunk in the shape of the invoking endpoint.
    fn chunk_frame(
        &self,
        content: Option<String>,
        finish_reason: Option<String>,
        created_at: Option<i64>,
    ) -> Bytes {
        let id = format!("chatcmpl-{}", chrono::Utc::now().timestamp_millis());
        let created = created_at.unwrap_or_else(|| chrono::Utc::now().timestamp());
        match self.shape {
            OutputShape::Chat => sse_frame(&ChatCompletionChunk {
                id,
                object: object_types::CHAT_COMPLETION_CHUNK.to_string(),
                created,
                model: self.model.clone(),
                choices: vec![ChatChunkChoice {
                    index: 0,
                    delta: ChatDelta { content },
                    finish_reason,
                }],
            }),
            OutputShape::Completion => sse_frame(&CompletionChunk {
                id,
                object: object_types::TEXT_COMPLETION.to_string(),
                created,
                model: self.model.clone(),
                choices: vec![CompletionChunkChoice {
                    index: 0,
                    // The finishing chunk carries an empty string, not
                    // an omitted field.
                    text: content.unwrap_or_default(),
                    finish_reason,
                }],
            }),
        }
    }
}

fn sse_frame<T: Serialize>(payload: &T) -> Bytes {
    let json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {}\n\n", json))
}

// ============================================================================
// HTTP wiring
// ============================================================================

/// Translate a backend byte stream into an SSE response.
///
/// Events are translated until the first outgoing frame before the
/// response is built, so a backend error that precedes any output still
/// yields an HTTP 500. After the first frame the status is committed
/// and later errors surface as inline SSE error frames.
pub(crate) async fn respond<S, E>(upstream: S, mut translator: StreamTranslator) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display,
{
    let mut upstream = upstream;
    let mut parser = EventParser::new();
    let mut pending: VecDeque<DifyEvent> = VecDeque::new();
    let mut first_frames: Vec<Bytes> = Vec::new();
    let mut error_before_output = false;

    'peek: loop {
        while let Some(event) = pending.pop_front() {
            let frames = translator.handle(&event);
            if !frames.is_empty() {
                error_before_output = matches!(event, DifyEvent::Error { .. });
                first_frames = frames;
                break 'peek;
            }
        }
        match upstream.next().await {
            Some(Ok(chunk)) => pending.extend(parser.push(&chunk)),
            Some(Err(err)) => {
                warn!(error = %err, "Backend stream read failed");
                break;
            }
            None => break,
        }
    }

    let status = if error_before_output {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(SSE_CHANNEL_SIZE);
    tokio::spawn(async move {
        for frame in first_frames {
            if tx.send(Ok(frame)).await.is_err() {
                return;
            }
        }
        if translator.is_terminated() {
            return;
        }
        loop {
            while let Some(event) = pending.pop_front() {
                for frame in translator.handle(&event) {
                    // Send failure means the client went away; dropping
                    // the upstream stream cancels the backend read.
                    if tx.send(Ok(frame)).await.is_err() {
                        return;
                    }
                }
                if translator.is_terminated() {
                    return;
                }
            }
            match upstream.next().await {
                Some(Ok(chunk)) => pending.extend(parser.push(&chunk)),
                Some(Err(err)) => {
                    warn!(error = %err, "Backend stream read failed");
                    return;
                }
                None => return,
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|err| {
            error!("Failed to build streaming response: {}", err);
            super::error::internal_error("Failed to build response")
        })
}
