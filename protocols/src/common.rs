use serde::{Deserialize, Serialize};

/// Token accounting attached to a finished response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Object type strings used in response envelopes.
pub mod object_types {
    pub const CHAT_COMPLETION: &str = "chat.completion";
    pub const CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";
    pub const TEXT_COMPLETION: &str = "text_completion";
    pub const MODEL: &str = "model";
    pub const LIST: &str = "list";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_serialization() {
        let usage = Usage {
            prompt_tokens: 5,
            completion_tokens: 3,
            total_tokens: 8,
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["prompt_tokens"], 5);
        assert_eq!(json["completion_tokens"], 3);
        assert_eq!(json["total_tokens"], 8);
    }
}
