// src/notify/slack.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::format::ChannelFormat;
use super::{ChannelId, ChannelSender, SendError};

pub struct SlackSender {
    webhook_url: String,
    client: Client,
}

impl SlackSender {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client,
        }
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    async fn send(&self, text: &str, format: &ChannelFormat) -> Result<(), SendError> {
        let body = json!({
            "text": text,
            "mrkdwn": true,
            "unfurl_links": format.link_previews,
            "unfurl_media": format.link_previews,
        });
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&body)
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
        ChannelId::Slack
    }
}
