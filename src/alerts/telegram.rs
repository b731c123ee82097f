//! Telegram alert delivery.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error};

use super::AlertSink;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends messages to a Telegram chat through the bot API.
pub struct TelegramAlertSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlertSink {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_api_base(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    /// Custom API base, for tests against a local endpoint.
    pub fn with_api_base(
        api_base: &str,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn push(&self, message: &str) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
        });
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("telegram alert delivered");
            }
            Ok(response) => {
                error!(status = %response.status(), "telegram alert rejected");
            }
            Err(e) => {
                error!(error = %e, "telegram alert delivery failed");
            }
        }
    }
}
