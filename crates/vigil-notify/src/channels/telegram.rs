use crate::NotificationChannel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram bot channel. One message is posted per configured chat id;
/// a chat-level failure is logged and the remaining chats still receive
/// the message.
pub struct TelegramChannel {
    client: reqwest::Client,
    token: String,
    chat_ids: Vec<String>,
    api_base: String,
}

impl TelegramChannel {
    /// `chat_ids` is the comma-separated list from configuration.
    /// `api_base` overrides the Telegram API host for tests.
    pub fn new(token: &str, chat_ids: &str, api_base: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            chat_ids: parse_chat_ids(chat_ids),
            api_base: api_base.unwrap_or(DEFAULT_API_BASE).to_string(),
        }
    }

    pub fn chat_count(&self) -> usize {
        self.chat_ids.len()
    }
}

pub(crate) fn parse_chat_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, text: &str) -> Result<()> {
        if self.token.is_empty() || self.chat_ids.is_empty() {
            tracing::warn!("Telegram token or chat ids missing, skipping message");
            return Ok(());
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let mut delivered = 0usize;
        for chat_id in &self.chat_ids {
            let result = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => delivered += 1,
                Ok(resp) => {
                    tracing::error!(
                        chat_id = %chat_id,
                        status = %resp.status(),
                        "Telegram send rejected"
                    );
                }
                Err(e) => {
                    tracing::error!(chat_id = %chat_id, error = %e, "Telegram send failed");
                }
            }
        }

        if delivered == 0 {
            return Err(anyhow!("no Telegram chat accepted the message"));
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
