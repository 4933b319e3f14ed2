//! Telegram Bot API client.
//!
//! Covers the single method the bot needs, `sendMessage`, including the
//! reply-keyboard markup for the welcome menu.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::state_machine::interpreter::Notifier;
use crate::state_machine::state::ChatId;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Timeout for calls against the Telegram API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram request failed: {0}")]
    Request(String),
    #[error("telegram API rejected the message: {0}")]
    Api(String),
}

/// One button of a reply keyboard.
#[derive(Debug, Clone, Serialize)]
pub struct KeyboardButton {
    pub text: String,
    pub request_contact: bool,
}

impl KeyboardButton {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            text: label.into(),
            request_contact: false,
        }
    }

    pub fn request_contact(label: impl Into<String>) -> Self {
        Self {
            text: label.into(),
            request_contact: true,
        }
    }
}

/// A custom reply keyboard shown under the input field.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
    pub one_time_keyboard: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: i64,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    /// Base URL override for tests.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);

        info!("Sending reply to chat {}", chat_id);

        let request_body = SendMessageRequest {
            chat_id: chat_id.0,
            text: text.to_string(),
            reply_markup: reply_markup.cloned(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            // The request URL embeds the bot token, so it must not end up in
            // the error message.
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let api_response: TelegramResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        if !api_response.ok {
            let description = api_response
                .description
                .unwrap_or_else(|| format!("HTTP {}", status));
            error!(
                "Telegram sendMessage failed for chat {}: {}",
                chat_id, description
            );
            return Err(NotifyError::Api(description));
        }

        Ok(())
    }
}
