//! Blocking Response Translator.
//!
//! Consumes the full demultiplexed event sequence into an accumulator,
//! then emits a single aggregated JSON response. Once a message-style
//! event has contributed answer text, a later `workflow_finished` must
//! not overwrite it; the `skip_workflow_finished` guard enforces that.

use std::fmt::Display;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use openai_compat::{
    chat::{ChatChoice, ChatCompletionResponse, ChatResponseMessage},
    common::{object_types, Usage},
    completion::{CompletionChoice, CompletionResponse},
};
use rand::Rng;
use serde_json::Value;
use tracing::{error, warn};

use super::{error as reporter, value_to_string, OutputShape};
use crate::dify::event::{DifyEvent, EventParser, EventUsage};

/// Usage fallbacks for backends that omit token counts. An explicit
/// policy, not an error.
const DEFAULT_PROMPT_TOKENS: u64 = 100;
const DEFAULT_COMPLETION_TOKENS: u64 = 10;
const DEFAULT_TOTAL_TOKENS: u64 = 110;

const SYSTEM_FINGERPRINT: &str = "fp_2f57f81c11";

/// Accumulator over the backend event sequence for one blocking request.
#[derive(Debug, Default)]
pub struct Aggregate {
    output_variable: Option<String>,
    answer: String,
    usage: Option<Usage>,
    message_ended: bool,
    has_error: bool,
    skip_workflow_finished: bool,
}

/// Terminal outcome of a blocking request.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Completed { answer: String, usage: Usage },
    BackendError,
    Incomplete,
}

impl Aggregate {
    pub fn new(output_variable: Option<String>) -> Self {
        Self {
            output_variable,
            ..Self::default()
        }
    }

    /// Fold one event into the accumulator. Returns `false` when
    /// consumption should stop (backend error).
    pub fn apply(&mut self, event: &DifyEvent) -> bool {
        match event {
            DifyEvent::Message { answer, .. } | DifyEvent::AgentMessage { answer, .. } => {
                self.answer.push_str(&value_to_string(answer));
                self.skip_workflow_finished = true;
            }
            DifyEvent::MessageEnd { metadata, .. } => {
                self.message_ended = true;
                self.usage = Some(usage_with_defaults(&metadata.usage, None));
            }
            DifyEvent::WorkflowFinished { data, metadata, .. } => {
                if !self.skip_workflow_finished {
                    self.message_ended = true;
                    self.answer = match self.output_variable.as_deref() {
                        Some(key) => data.outputs.get(key).map(value_to_string).unwrap_or_default(),
                        None => value_to_string(&Value::Object(data.outputs.clone())),
                    };
                    self.usage = Some(usage_with_defaults(&metadata.usage, data.total_tokens));
                }
            }
            DifyEvent::Error { code, message } => {
                error!(code = %code, message = %message, "Backend signaled an error");
                self.has_error = true;
                return false;
            }
            DifyEvent::AgentThought
            | DifyEvent::Ping
            | DifyEvent::TextChunk { .. }
            | DifyEvent::Unknown => {}
        }
        true
    }

    pub fn finish(self) -> Outcome {
        if self.has_error {
            Outcome::BackendError
        } else if self.message_ended {
            Outcome::Completed {
                answer: self.answer.trim().to_string(),
                usage: self.usage.unwrap_or(Usage {
                    prompt_tokens: DEFAULT_PROMPT_TOKENS,
                    completion_tokens: DEFAULT_COMPLETION_TOKENS,
                    total_tokens: DEFAULT_TOTAL_TOKENS,
                }),
            }
        } else {
            Outcome::Incomplete
        }
    }
}

/// Fill in missing token counts. `total_override` sources the total from
/// `data.total_tokens` on workflow events when present.
fn usage_with_defaults(usage: &EventUsage, total_override: Option<u64>) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens.unwrap_or(DEFAULT_PROMPT_TOKENS),
        completion_tokens: usage
            .completion_tokens
            .unwrap_or(DEFAULT_COMPLETION_TOKENS),
        total_tokens: total_override
            .or(usage.total_tokens)
            .unwrap_or(DEFAULT_TOTAL_TOKENS),
    }
}

// ============================================================================
// HTTP wiring
// ============================================================================

/// Consume the whole backend byte stream and answer with one JSON body.
pub(crate) async fn respond<S, E>(
    upstream: S,
    mut aggregate: Aggregate,
    shape: OutputShape,
    model: String,
) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut upstream = upstream;
    let mut parser = EventParser::new();

    'consume: while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(chunk) => {
                for event in parser.push(&chunk) {
                    if !aggregate.apply(&event) {
                        break 'consume;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Backend stream read failed");
                break;
            }
        }
    }

    match aggregate.finish() {
        Outcome::Completed { answer, usage } => completed_response(shape, model, answer, usage),
        Outcome::BackendError => reporter::generic_internal_error(),
        Outcome::Incomplete => reporter::unexpected_end_of_stream(),
    }
}

fn completed_response(shape: OutputShape, model: String, answer: String, usage: Usage) -> Response {
    let id = completion_id();
    let created = chrono::Utc::now().timestamp();
    match shape {
        OutputShape::Chat => (
            StatusCode::OK,
            Json(ChatCompletionResponse {
                id,
                object: object_types::CHAT_COMPLETION.to_string(),
                created,
                model,
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatResponseMessage {
                        role: "assistant".to_string(),
                        content: answer,
                    },
                    logprobs: None,
                    finish_reason: Some("stop".to_string()),
                }],
                usage,
                system_fingerprint: Some(SYSTEM_FINGERPRINT.to_string()),
            }),
        )
            .into_response(),
        OutputShape::Completion => (
            StatusCode::OK,
            Json(CompletionResponse {
                id,
                object: object_types::TEXT_COMPLETION.to_string(),
                created,
                model,
                choices: vec![CompletionChoice {
                    index: 0,
                    text: answer,
                    logprobs: None,
                    finish_reason: Some("stop".to_string()),
                }],
                usage,
                system_fingerprint: Some(SYSTEM_FINGERPRINT.to_string()),
            }),
        )
            .into_response(),
    }
}

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// `chatcmpl-` plus 29 random alphanumeric characters.
fn completion_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..29)
        .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("chatcmpl-{}", suffix)
}

#[cfg(test)]
mod tests {
    use std::io;

    use serde_json::json;

    use super::*;
    use crate::dify::event::{EventMetadata, WorkflowFinishedData};

    fn message(answer: &str) -> DifyEvent {
        DifyEvent::Message {
            answer: Value::String(answer.to_string()),
            created_at: Some(1),
        }
    }

    fn message_end(usage: EventUsage) -> DifyEvent {
        DifyEvent::MessageEnd {
            metadata: EventMetadata { usage },
            created_at: Some(2),
        }
    }

    fn workflow_finished(outputs: Value, total_tokens: Option<u64>) -> DifyEvent {
        let outputs = match outputs {
            Value::Object(map) => map,
            _ => panic!("outputs must be an object"),
        };
        DifyEvent::WorkflowFinished {
            data: WorkflowFinishedData {
                outputs,
                total_tokens,
            },
            metadata: Default::default(),
            created_at: Some(3),
        }
    }

    #[test]
    fn test_accumulates_and_trims_answer_fragments() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&message(" Hel"));
        aggregate.apply(&message("lo "));
        aggregate.apply(&message_end(EventUsage {
            prompt_tokens: Some(5),
            completion_tokens: Some(3),
            total_tokens: Some(8),
        }));
        assert_eq!(
            aggregate.finish(),
            Outcome::Completed {
                answer: "Hello".to_string(),
                usage: Usage {
                    prompt_tokens: 5,
                    completion_tokens: 3,
                    total_tokens: 8,
                },
            }
        );
    }

    #[test]
    fn test_missing_usage_falls_back_to_defaults() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&message("Hi"));
        aggregate.apply(&message_end(EventUsage::default()));
        match aggregate.finish() {
            Outcome::Completed { usage, .. } => {
                assert_eq!(usage.prompt_tokens, 100);
                assert_eq!(usage.completion_tokens, 10);
                assert_eq!(usage.total_tokens, 110);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_workflow_finished_supplies_answer_when_no_message_preceded() {
        let mut aggregate = Aggregate::new(Some("result".to_string()));
        aggregate.apply(&workflow_finished(json!({"result": "done"}), Some(42)));
        assert_eq!(
            aggregate.finish(),
            Outcome::Completed {
                answer: "done".to_string(),
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 10,
                    total_tokens: 42,
                },
            }
        );
    }

    #[test]
    fn test_workflow_finished_skipped_after_message() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&message("Answer"));
        aggregate.apply(&workflow_finished(json!({"result": "overwrite"}), None));
        match aggregate.finish() {
            Outcome::Completed { answer, .. } => assert_eq!(answer, "Answer"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_workflow_outputs_without_variable_are_stringified() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&workflow_finished(json!({"a": 1}), None));
        match aggregate.finish() {
            Outcome::Completed { answer, .. } => assert_eq!(answer, "{\"a\":1}"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_error_event_stops_consumption() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&message("partial"));
        assert!(!aggregate.apply(&DifyEvent::Error {
            code: Value::from(500),
            message: "boom".to_string(),
        }));
        assert_eq!(aggregate.finish(), Outcome::BackendError);
    }

    #[test]
    fn test_stream_end_without_terminal_is_incomplete() {
        let mut aggregate = Aggregate::new(None);
        aggregate.apply(&message("partial"));
        assert_eq!(aggregate.finish(), Outcome::Incomplete);
    }

    #[test]
    fn test_completion_id_shape() {
        let id = completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 29);
        assert!(id["chatcmpl-".len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
    }

    // ------------------------------------------------------------------
    // HTTP wiring
    // ------------------------------------------------------------------

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_blocking_chat_scenario() {
        let upstream = byte_stream(vec![
            "data: {\"event\":\"message\",\"answer\":\"Hello\",\"created_at\":1}\n",
            "data: {\"event\":\"message_end\",\"metadata\":{\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":3,\"total_tokens\":8}}}\n",
        ]);
        let response = respond(
            upstream,
            Aggregate::new(None),
            OutputShape::Chat,
            "dify".to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["usage"]["prompt_tokens"], 5);
        assert_eq!(body["usage"]["completion_tokens"], 3);
        assert_eq!(body["usage"]["total_tokens"], 8);
    }

    #[tokio::test]
    async fn test_blocking_completion_scenario() {
        let upstream = byte_stream(vec![
            "data: {\"event\":\"message\",\"answer\":\"Hi!\",\"created_at\":1}\n\
             data: {\"event\":\"message_end\",\"metadata\":{}}\n",
        ]);
        let response = respond(
            upstream,
            Aggregate::new(None),
            OutputShape::Completion,
            "dify".to_string(),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["object"], "text_completion");
        assert_eq!(body["choices"][0]["text"], "Hi!");
    }

    #[tokio::test]
    async fn test_blocking_error_is_generic_500() {
        let upstream = byte_stream(vec![
            "data: {\"event\":\"error\",\"code\":400,\"message\":\"bad input\"}\n",
        ]);
        let response = respond(
            upstream,
            Aggregate::new(None),
            OutputShape::Chat,
            "dify".to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        // Backend message is logged, not surfaced in blocking mode.
        assert_eq!(body["error"], "An error occurred while processing the request.");
    }

    #[tokio::test]
    async fn test_blocking_incomplete_stream_is_500() {
        let upstream = byte_stream(vec![
            "data: {\"event\":\"message\",\"answer\":\"partial\",\"created_at\":1}\n",
        ]);
        let response = respond(
            upstream,
            Aggregate::new(None),
            OutputShape::Chat,
            "dify".to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Unexpected end of stream.");
    }
}
