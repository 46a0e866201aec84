// src/notify/discord.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::format::ChannelFormat;
use super::{ChannelId, ChannelSender, SendError};

#[derive(Clone)]
pub struct DiscordSender {
    webhook: String,
    client: Client,
}

impl DiscordSender {
    pub fn new(client: Client, webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            client,
        }
    }
}

#[derive(Serialize)]
struct DiscordEmbed<'a> {
    description: &'a str,
}

#[derive(Serialize)]
struct DiscordWebhookPayload<'a> {
    content: Option<&'a str>,
    embeds: Vec<DiscordEmbed<'a>>,
}

#[async_trait]
impl ChannelSender for DiscordSender {
    async fn send(&self, text: &str, _format: &ChannelFormat) -> Result<(), SendError> {
        // Embed descriptions take 4096 chars, `content` only 2000. Embed links never unfurl.
        let payload = DiscordWebhookPayload {
            content: None,
            embeds: vec![DiscordEmbed { description: text }],
        };
        let resp = self
            .client
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await
            .map_err(SendError::from_reqwest)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = super::retry_after_header(resp.headers());
        let detail = resp.text().await.unwrap_or_default();
        Err(SendError::from_status(status, detail, retry_after))
    }

    fn channel(&self) -> ChannelId {
        ChannelId::Discord
    }
}
