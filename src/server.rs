//! Router construction and the serve loop.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::GatewayConfig,
    dify::client::DifyClient,
    routers::{self, AppState},
};

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("dnt"),
            header::USER_AGENT,
            HeaderName::from_static("x-requested-with"),
            header::IF_MODIFIED_SINCE,
            header::CACHE_CONTROL,
            header::CONTENT_TYPE,
            header::RANGE,
            header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/", get(welcome))
        .route("/v1/models", get(routers::list_models))
        .route("/v1/chat/completions", post(routers::chat_completions))
        .route("/v1/completions", post(routers::completions))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> Html<&'static str> {
    Html(
        "<html>\
           <head><title>DIFY2OPENAI</title></head>\
           <body>\
             <h1>Dify2OpenAI</h1>\
             <p>Congratulations! Your project has been successfully deployed.</p>\
           </body>\
         </html>",
    )
}

pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let dify = DifyClient::new(&config.dify_api_url, config.bot_type);
    let state = Arc::new(AppState { config, dify });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "dify-gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::BotType;

    fn test_state() -> Arc<AppState> {
        let config = GatewayConfig {
            dify_api_url: "http://dify.local/v1".to_string(),
            bot_type: BotType::Chat,
            input_variable: None,
            output_variable: None,
            models_name: "dify".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let dify = DifyClient::new(&config.dify_api_url, config.bot_type);
        Arc::new(AppState { config, dify })
    }

    #[tokio::test]
    async fn test_models_endpoint_lists_configured_model() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "dify");
        assert_eq!(body["data"][0]["owned_by"], "dify");
    }

    #[tokio::test]
    async fn test_missing_bearer_token_is_401_before_any_backend_call() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"model":"dify","messages":[{"role":"user","content":"Hi"}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 401);
        assert_eq!(body["errmsg"], "Unauthorized.");
    }

    #[tokio::test]
    async fn test_empty_messages_is_400_before_any_backend_call() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer app-secret")
                    .body(Body::from(r#"{"model":"dify","messages":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "messages must not be empty");
    }

    #[tokio::test]
    async fn test_welcome_page() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
