use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RelayError, RelayResult};
use crate::config::env_trimmed;

/// Telegram bot settings. Both token and chat id are needed to forward.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            api_url: "https://api.telegram.org".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `None` when forwarding is not configured
    pub fn from_env() -> Option<Self> {
        let bot_token = env_trimmed("TELEGRAM_BOT_TOKEN");
        let chat_id = env_trimmed("TELEGRAM_CHAT_ID");

        match (bot_token, chat_id) {
            (Some(bot_token), Some(chat_id)) => {
                let mut config = Self::new(bot_token, chat_id);
                if let Some(api_url) = env_trimmed("TELEGRAM_API_URL") {
                    config.api_url = api_url;
                }
                tracing::info!(chat_id = %config.chat_id, "Telegram forwarding enabled");
                Some(config)
            }
            (None, None) => {
                tracing::warn!("Telegram forwarding disabled, notifications are only logged");
                None
            }
            _ => {
                tracing::warn!(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set to forward notifications"
                );
                None
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client for `sendMessage`
pub struct TelegramNotifier {
    endpoint: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        Ok(Self {
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            client,
        })
    }

    pub async fn send(&self, text: &str) -> RelayResult<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            // reqwest errors include the URL, which contains the bot token
            .map_err(|e| RelayError::Telegram(e.without_url().to_string()))?;

        let status = response.status();
        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Telegram(format!("unreadable response ({}): {}", status, e.without_url())))?;

        if !status.is_success() || !body.ok {
            return Err(RelayError::Telegram(
                body.description
                    .unwrap_or_else(|| format!("status {}", status)),
            ));
        }

        Ok(())
    }
}
