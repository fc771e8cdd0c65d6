//! Model listing types for the `/v1/models` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelList {
    pub object: String, // "list"
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCard {
    /// Model ID advertised to clients
    pub id: String,
    pub object: String, // "model"
    pub owned_by: String,
    /// Always null; legacy OpenAI field some clients still read
    pub permission: Option<Value>,
}

impl ModelList {
    /// A single-model list, which is all this gateway ever advertises.
    pub fn single(id: impl Into<String>, owned_by: impl Into<String>) -> Self {
        Self {
            object: super::common::object_types::LIST.to_string(),
            data: vec![ModelCard {
                id: id.into(),
                object: super::common::object_types::MODEL.to_string(),
                owned_by: owned_by.into(),
                permission: None,
            }],
        }
    }
}
