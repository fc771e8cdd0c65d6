//! Gateway configuration.
//!
//! Every setting has a CLI flag and an environment fallback. The parsed
//! [`GatewayConfig`] is built once at startup and handed to the routers
//! by reference; translation logic never reads the environment.

use clap::{Args, ValueEnum};

/// The kind of Dify application behind the gateway. Determines which
/// backend endpoint receives the composed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BotType {
    Chat,
    Completion,
    Workflow,
}

impl BotType {
    /// Backend path for this application type, relative to the API base.
    pub fn api_path(self) -> &'static str {
        match self {
            BotType::Chat => "/chat-messages",
            BotType::Completion => "/completion-messages",
            BotType::Workflow => "/workflows/run",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    /// Base URL of the Dify API, e.g. https://api.dify.ai/v1
    #[arg(long, env = "DIFY_API_URL")]
    pub dify_api_url: String,

    /// Dify application type behind the gateway
    #[arg(long, env = "BOT_TYPE", value_enum, ignore_case = true, default_value = "chat")]
    pub bot_type: BotType,

    /// When set, the composed query is sent under `inputs.<name>`
    /// instead of the top-level `query` field
    #[arg(long, env = "INPUT_VARIABLE")]
    pub input_variable: Option<String>,

    /// When set, selects this key out of structured backend answers
    /// and workflow outputs
    #[arg(long, env = "OUTPUT_VARIABLE")]
    pub output_variable: Option<String>,

    /// Model id advertised on /v1/models
    #[arg(long, env = "MODELS_NAME", default_value = "dify")]
    pub models_name: String,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
}

impl GatewayConfig {
    /// Empty-string environment values mean "unset".
    pub fn normalized(mut self) -> Self {
        if self.input_variable.as_deref() == Some("") {
            self.input_variable = None;
        }
        if self.output_variable.as_deref() == Some("") {
            self.output_variable = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_path_per_bot_type() {
        assert_eq!(BotType::Chat.api_path(), "/chat-messages");
        assert_eq!(BotType::Completion.api_path(), "/completion-messages");
        assert_eq!(BotType::Workflow.api_path(), "/workflows/run");
    }

    #[test]
    fn test_empty_variables_normalize_to_none() {
        let config = GatewayConfig {
            dify_api_url: "http://dify.local/v1".to_string(),
            bot_type: BotType::Chat,
            input_variable: Some(String::new()),
            output_variable: Some("result".to_string()),
            models_name: "dify".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
        .normalized();
        assert_eq!(config.input_variable, None);
        assert_eq!(config.output_variable.as_deref(), Some("result"));
    }
}
