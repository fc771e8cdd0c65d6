//! OpenAI-compatible API gateway for Dify conversational workflows.
//!
//! Exposes `/v1/chat/completions`, `/v1/completions` and `/v1/models`
//! and translates between the OpenAI wire protocol and the Dify
//! streaming event protocol in both directions.

pub mod config;
pub mod dify;
pub mod routers;
pub mod server;
