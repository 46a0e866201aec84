// src/config/mod.rs
//! Application configuration: one file (TOML or JSON) with `pipeline`, `dedup`,
//! `sources`, `ai` and `notifications` sections.

pub mod ai;
pub mod notify;
pub mod sources;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use ai::{AiConfig, AnthropicConfig, SummaryConfig};
pub use notify::{ChannelCommon, EmailConfig, NotificationsConfig, TelegramConfig, WebhookConfig};
pub use sources::{QuotaUnit, SourceConfig, SourceKind};

pub const ENV_CONFIG_PATH: &str = "BRIEF_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/brief.toml";
pub const DEFAULT_JSON_PATH: &str = "config/brief.json";

fn default_interval_secs() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}
fn default_retention_days() -> u32 {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Return articles of failed/cancelled batches to the unseen pool.
    #[serde(default = "default_true")]
    pub requeue_failed: bool,
    /// Where limiter and dedup snapshots live; absent keeps state in memory only.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Run reports kept for `/runs`.
    #[serde(default)]
    pub history_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            requeue_failed: true,
            state_dir: None,
            history_capacity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// 0 keeps ids forever.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Normalized Levenshtein similarity above which titles from different sources collapse.
    #[serde(default)]
    pub title_similarity: Option<f64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            title_similarity: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl AppConfig {
    /// Enabled sources in name order.
    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.sources
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    /// Fill derived fields, resolve `"ENV"` secrets, sanitize values.
    pub fn finalize(mut self) -> Result<Self> {
        for (name, src) in self.sources.iter_mut() {
            src.name = name.clone();
            if let SourceKind::NewsApi { api_key, .. } = &mut src.kind {
                resolve_secret(api_key, "NEWSAPI_API_KEY", src.enabled)
                    .with_context(|| format!("source `{name}`"))?;
            }
            if let SourceKind::Rss { feeds } = &src.kind {
                if src.enabled && feeds.is_empty() {
                    bail!("source `{name}` is an rss source without feeds");
                }
            }
            if let SourceKind::Reddit { subreddits, .. } = &src.kind {
                if src.enabled && subreddits.is_empty() {
                    bail!("source `{name}` is a reddit source without subreddits");
                }
            }
        }

        self.ai.anthropic.sanitize();
        resolve_secret(&mut self.ai.anthropic.api_key, "ANTHROPIC_API_KEY", false)?;

        if let Some(tg) = self.notifications.telegram.as_mut() {
            resolve_secret(&mut tg.bot_token, "TELEGRAM_BOT_TOKEN", tg.common.enabled)
                .context("notifications.telegram")?;
        }
        if let Some(mail) = self.notifications.email.as_mut() {
            let on = mail.common.enabled;
            resolve_secret(&mut mail.smtp_user, "SMTP_USER", on).context("notifications.email")?;
            resolve_secret(&mut mail.smtp_pass, "SMTP_PASS", on).context("notifications.email")?;
        }
        if let Some(slack) = self.notifications.slack.as_mut() {
            resolve_secret(&mut slack.webhook_url, "SLACK_WEBHOOK_URL", slack.common.enabled)
                .context("notifications.slack")?;
        }
        if let Some(discord) = self.notifications.discord.as_mut() {
            resolve_secret(
                &mut discord.webhook_url,
                "DISCORD_WEBHOOK_URL",
                discord.common.enabled,
            )
            .context("notifications.discord")?;
        }

        if let Some(t) = self.dedup.title_similarity {
            if !(0.0..=1.0).contains(&t) {
                self.dedup.title_similarity = None;
            }
        }
        Ok(self)
    }
}

/// `"ENV"` (any case) is replaced by the env var; a missing var is an error only when `required`.
fn resolve_secret(value: &mut String, env_key: &str, required: bool) -> Result<()> {
    if !value.trim().eq_ignore_ascii_case("env") {
        return Ok(());
    }
    match std::env::var(env_key) {
        Ok(v) => {
            *value = v;
            Ok(())
        }
        Err(_) if required => Err(anyhow!("Missing {env_key} env var")),
        Err(_) => {
            value.clear();
            Ok(())
        }
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())?.finalize()
}

/// Load config using env var + fallbacks:
/// 1) $BRIEF_CONFIG_PATH
/// 2) config/brief.toml
/// 3) config/brief.json
pub fn load_config_default() -> Result<AppConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path");
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    bail!("no config found ({DEFAULT_TOML_PATH}, {DEFAULT_JSON_PATH} or ${ENV_CONFIG_PATH})")
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("parsing toml config"),
        "json" => serde_json::from_str(s).context("parsing json config"),
        _ => {
            if let Ok(cfg) = serde_json::from_str(s) {
                return Ok(cfg);
            }
            toml::from_str(s).context("unsupported config format")
        }
    }
}
