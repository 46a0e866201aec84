// src/notify/telegram.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::format::ChannelFormat;
use super::{ChannelId, ChannelSender, SendError};
use crate::config::TelegramConfig;

/// Bot API `sendMessage`.
pub struct TelegramSender {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Deserialize, Default)]
struct ApiReply {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Deserialize, Default)]
struct ReplyParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramSender {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn from_config(client: Client, cfg: &TelegramConfig) -> anyhow::Result<Self> {
        if cfg.bot_token.trim().is_empty() || cfg.chat_id.trim().is_empty() {
            anyhow::bail!("telegram needs bot_token and chat_id");
        }
        Ok(Self::new(client, &cfg.api_base, &cfg.bot_token, &cfg.chat_id))
    }

    fn url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    async fn send(&self, text: &str, format: &ChannelFormat) -> Result<(), SendError> {
        let mut body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": !format.link_previews,
        });
        if let Some(mode) = format.markup.telegram_parse_mode() {
            body["parse_mode"] = json!(mode);
        }

        let resp = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(SendError::from_reqwest)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let raw = resp.text().await.unwrap_or_default();
        let reply: ApiReply = serde_json::from_str(&raw).unwrap_or_default();
        let retry_after = reply
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);
        let detail = reply.description.unwrap_or(raw);
        Err(SendError::from_status(status, detail, retry_after))
    }

    fn channel(&self) -> ChannelId {
        ChannelId::Telegram
    }
}
