//! OpenAI-compatible API protocol definitions.
//!
//! Wire types for the chat completions and legacy completions surfaces
//! exposed by the gateway, plus the model listing types. These mirror
//! the OpenAI request/response shapes closely enough for off-the-shelf
//! OpenAI clients to talk to a Dify backend through us.

pub mod chat;
pub mod common;
pub mod completion;
pub mod model_card;
