//! HTTP handlers for the OpenAI-compatible surface.

pub mod compose;
pub mod error;
pub mod non_streaming;
pub mod streaming;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use openai_compat::{
    chat::ChatCompletionRequest, completion::CompletionRequest, model_card::ModelList,
};
use serde_json::Value;
use tracing::error;

use crate::{config::GatewayConfig, dify::client::DifyClient};
use non_streaming::Aggregate;
use streaming::StreamTranslator;

/// Which outgoing payload shape the invoking endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// `/chat/completions`: deltas under `delta.content`
    Chat,
    /// `/completions`: text directly on the choice
    Completion,
}

/// Shared per-process state: the configuration and the backend client,
/// both immutable after startup.
pub struct AppState {
    pub config: GatewayConfig,
    pub dify: DifyClient,
}

/// String form of a backend-supplied JSON value: strings pass through,
/// null becomes empty, everything else is serialized.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The bearer token, if the Authorization header carries a non-empty one.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.split_whitespace().nth(1)?;
    (!token.is_empty()).then_some(token)
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    Json(ModelList::single(state.config.models_name.as_str(), "dify")).into_response()
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return error::unauthorized();
    };

    let Some(composed) = compose::compose_chat_query(&request.messages, state.config.bot_type)
    else {
        return error::bad_request("messages must not be empty");
    };
    let payload = compose::build_dify_request(
        composed,
        request.stream,
        state.config.input_variable.as_deref(),
    );

    let upstream = match state.dify.send(&payload, token).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Dify request failed");
            return error::generic_internal_error();
        }
    };

    dispatch(&state, upstream, OutputShape::Chat, request.model, request.stream).await
}

/// POST /v1/completions
pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return error::unauthorized();
    };

    let composed = compose::compose_completion_query(&request.prompt);
    let payload = compose::build_dify_request(
        composed,
        request.stream,
        state.config.input_variable.as_deref(),
    );

    let upstream = match state.dify.send(&payload, token).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Dify request failed");
            return error::generic_internal_error();
        }
    };

    dispatch(&state, upstream, OutputShape::Completion, request.model, request.stream).await
}

/// Branch on the request's `stream` flag into the streaming or blocking
/// translator.
async fn dispatch(
    state: &AppState,
    upstream: reqwest::Response,
    shape: OutputShape,
    model: String,
    stream: bool,
) -> Response {
    let output_variable = state.config.output_variable.clone();
    let body = Box::pin(upstream.bytes_stream());
    if stream {
        let translator = StreamTranslator::new(shape, model, output_variable);
        streaming::respond(body, translator).await
    } else {
        let aggregate = Aggregate::new(output_variable);
        non_streaming::respond(body, aggregate, shape, model).await
    }
}
