//! Outbound HTTP client for the Dify API.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::BotType;

/// Payload sent to the Dify endpoint. Either `query` is set (default)
/// or the query rides inside `inputs` under a configured variable name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifyRequest {
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub response_mode: &'static str, // "streaming" | "blocking"
    pub conversation_id: String,     // always empty: each call is a standalone turn
    pub user: &'static str,
    pub auto_generate_name: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ImageDescriptor>,
}

/// Base64 image attachment in the shape Dify expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str, // "image"
    pub transfer_method: &'static str, // "base64"
    pub upload_file: String,
}

impl ImageDescriptor {
    pub fn base64(data: impl Into<String>) -> Self {
        Self {
            kind: "image",
            transfer_method: "base64",
            upload_file: data.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DifyClientError {
    #[error("failed to reach Dify backend: {0}")]
    Transport(#[from] reqwest::Error),
}

/// HTTP client bound to one Dify application endpoint. The endpoint is
/// derived once from the API base and the configured bot type.
#[derive(Debug, Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DifyClient {
    pub fn new(base_url: &str, bot_type: BotType) -> Self {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), bot_type.api_path());
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    /// POST the composed payload with the caller's bearer token and
    /// return the (streaming) response. The token is forwarded verbatim;
    /// validation is Dify's job.
    pub async fn send(
        &self,
        payload: &DifyRequest,
        token: &str,
    ) -> Result<reqwest::Response, DifyClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;
        Ok(response)
    }
}
