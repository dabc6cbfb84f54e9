use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::dispatch::Dispatcher;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", post(webhook))
        .with_state(AppState { dispatcher })
}

async fn health() -> &'static str {
    "tiabot online"
}

/// The webhook contract never surfaces internal errors: every JSON
/// payload gets HTTP 200 with a status acknowledgment.
async fn webhook(State(state): State<AppState>, Json(payload): Json<Value>) -> Json<Value> {
    debug!("Webhook event: {}", payload["event"].as_str().unwrap_or("?"));
    let status = state.dispatcher.handle(payload).await;
    Json(json!({ "status": status.as_str() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, DigestConfig, LlmConfig, ServerConfig, TriggerConfig, WhatsAppConfig,
    };
    use crate::llm::TextGenerator;
    use crate::whatsapp::MessageSender;
    use anyhow::Result;
    use async_trait::async_trait;

    struct StubGenerator;

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("stub".to_string())
        }
    }

    struct StubSender;

    #[async_trait]
    impl MessageSender for StubSender {
        async fn send_text(&self, _to_jid: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn state() -> AppState {
        let config = Config {
            llm: LlmConfig {
                api_key: "k".to_string(),
                model: "gemini-2.0-flash".to_string(),
            },
            whatsapp: WhatsAppConfig {
                base_url: "http://localhost:8080".to_string(),
                api_key: String::new(),
                instance: "tiabot".to_string(),
            },
            trigger: TriggerConfig {
                token: "@tia".to_string(),
                group_only: false,
            },
            digest: DigestConfig {
                group_jid: None,
                weather_api_key: None,
                news_api_key: None,
                locations: vec![],
                hour: 6,
                minute: 30,
            },
            server: ServerConfig { port: 5000 },
        };
        AppState {
            dispatcher: Arc::new(Dispatcher::new(
                &config,
                Arc::new(StubGenerator),
                Arc::new(StubSender),
            )),
        }
    }

    #[tokio::test]
    async fn test_health_is_static() {
        assert_eq!(health().await, "tiabot online");
    }

    #[tokio::test]
    async fn test_webhook_acks_ok_for_unknown_event() {
        let Json(body) = webhook(
            State(state()),
            Json(json!({ "event": "qrcode.updated", "data": {} })),
        )
        .await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_webhook_acks_ignored_for_self_message() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": { "fromMe": true, "remoteJid": "123@g.us" },
                "message": { "conversation": "@tia hi" }
            }
        });
        let Json(body) = webhook(State(state()), Json(payload)).await;
        assert_eq!(body["status"], "ignored");
    }
}
