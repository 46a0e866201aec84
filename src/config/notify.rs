// src/config/notify.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_retry_count() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_subject() -> String {
    "News brief".to_string()
}

/// Keys every channel understands. Formatting keys are data for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCommon {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds per send.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// "Markdown" | "MarkdownV2" | "HTML"; absent means plain text.
    #[serde(default)]
    pub parse_mode: Option<String>,
    #[serde(default)]
    pub disable_web_page_preview: bool,
    /// Overrides `ai.summary.include_links` for this channel.
    #[serde(default)]
    pub include_links: Option<bool>,
    #[serde(default)]
    pub max_message_chars: Option<usize>,
}

impl Default for ChannelCommon {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_count: default_retry_count(),
            timeout: default_timeout_secs(),
            parse_mode: None,
            disable_web_page_preview: false,
            include_links: None,
            max_message_chars: None,
        }
    }
}

impl ChannelCommon {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(flatten)]
    pub common: ChannelCommon,
    /// "ENV" means: read from TELEGRAM_BOT_TOKEN
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(flatten)]
    pub common: ChannelCommon,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// "ENV" means: read from SMTP_USER
    #[serde(default)]
    pub smtp_user: String,
    /// "ENV" means: read from SMTP_PASS
    #[serde(default)]
    pub smtp_pass: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(flatten)]
    pub common: ChannelCommon,
    /// "ENV" means: read from SLACK_WEBHOOK_URL / DISCORD_WEBHOOK_URL
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub slack: Option<WebhookConfig>,
    #[serde(default)]
    pub discord: Option<WebhookConfig>,
}

impl NotificationsConfig {
    pub fn enabled_count(&self) -> usize {
        [
            self.telegram.as_ref().map(|c| c.common.enabled),
            self.email.as_ref().map(|c| c.common.enabled),
            self.slack.as_ref().map(|c| c.common.enabled),
            self.discord.as_ref().map(|c| c.common.enabled),
        ]
        .into_iter()
        .filter(|e| *e == Some(true))
        .count()
    }
}
