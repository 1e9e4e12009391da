use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use super::{NotificationSender, SenderError, http_client};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramSender {
    pub fn new(bot_token: &str) -> Result<Self, SenderError> {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(bot_token: &str, api_base: &str) -> Result<Self, SenderError> {
        if bot_token.trim().is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "Telegram bot token is empty".to_string(),
            ));
        }
        Ok(Self {
            client: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        recipient: &str,
        message: &str,
        _context: &HashMap<String, String>, // Telegram takes the message as rendered
    ) -> Result<(), SenderError> {
        let api_url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let payload = TelegramMessage {
            chat_id: recipient,
            text: message,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        // The request URL embeds the bot token, so it is stripped from errors.
        let response = self
            .client
            .post(&api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SenderError::NetworkError(e.without_url()))?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Telegram API returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
