//! Typed Dify stream events and the byte-stream demultiplexer.
//!
//! The backend answers with newline-delimited frames, most of them
//! `data: {json}` lines in SSE style. [`EventParser`] reassembles frames
//! that arrive split across network chunks and maps each complete line
//! into a [`DifyEvent`]. Parsing is chunk-boundary invariant: feeding
//! the same bytes in different chunkings yields the same events.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Maximum demultiplexer buffer size (1 MB). A backend that never sends
/// a newline cannot grow the buffer past this; the fragment is dropped.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

// ============================================================================
// Event types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub usage: EventUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextChunkData {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowFinishedData {
    /// Output variables produced by the workflow
    #[serde(default)]
    pub outputs: Map<String, Value>,
    pub total_tokens: Option<u64>,
}

/// One event from the Dify stream, tagged by its `event` field.
///
/// `answer` is left as a raw [`Value`]: chat apps send a string, but
/// workflow apps can send a keyed mapping that the translators select
/// from via the configured output variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DifyEvent {
    Message {
        #[serde(default)]
        answer: Value,
        created_at: Option<i64>,
    },
    AgentMessage {
        #[serde(default)]
        answer: Value,
        created_at: Option<i64>,
    },
    TextChunk {
        #[serde(default)]
        data: TextChunkData,
        created_at: Option<i64>,
    },
    AgentThought,
    Ping,
    MessageEnd {
        #[serde(default)]
        metadata: EventMetadata,
        created_at: Option<i64>,
    },
    WorkflowFinished {
        #[serde(default)]
        data: WorkflowFinishedData,
        #[serde(default)]
        metadata: EventMetadata,
        created_at: Option<i64>,
    },
    Error {
        #[serde(default)]
        code: Value,
        #[serde(default)]
        message: String,
    },
    /// Unrecognized event kinds are no-ops, so new backend event types
    /// cannot break the stream.
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Demultiplexer
// ============================================================================

/// Reassembles the backend's newline-delimited frames from raw byte
/// chunks and parses them into [`DifyEvent`]s.
///
/// The trailing fragment of each chunk (no newline yet) stays buffered
/// until the rest of the line arrives. Lines that are not `data:`-style
/// JSON objects are discarded; a JSON parse failure skips the line
/// rather than failing the stream.
#[derive(Debug, Default)]
pub struct EventParser {
    buffer: String,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of backend bytes, returning all events completed
    /// by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DifyEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_BUFFER_SIZE {
            warn!(
                buffered = self.buffer.len(),
                "Dropping oversized unterminated backend frame"
            );
            self.buffer.clear();
        }

        events
    }
}

/// Parse one complete line into an event, or `None` for noise
/// (keep-alives, SSE comments, unparseable JSON).
fn parse_line(line: &str) -> Option<DifyEvent> {
    let line = line.trim();
    let line = line.strip_prefix("data:").unwrap_or(line).trim();
    if !line.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<DifyEvent>(line) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(%error, "Skipping unparseable backend line");
            None
        }
    }
}
