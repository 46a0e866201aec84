// src/notify/mod.rs
//! Digest fan-out. One task per enabled channel; a channel's failure never touches another.

pub mod discord;
pub mod email;
pub mod format;
pub mod slack;
pub mod telegram;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use format::{render, split_message, ChannelFormat, Markup};

use crate::config::{NotificationsConfig, SummaryConfig};
use crate::error::NotificationFailure;
use crate::retry::{retry, RetryError, RetryPolicy, Transient};
use crate::summarize::SummaryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Telegram,
    Email,
    Slack,
    Discord,
}

impl ChannelId {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Telegram => "telegram",
            ChannelId::Email => "email",
            ChannelId::Slack => "slack",
            ChannelId::Discord => "discord",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport failure of a single send.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited by channel")]
    RateLimited { retry_after: Option<Duration> },
    #[error("rejected: {0}")]
    Rejected(String),
}

impl SendError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        SendError::Transport(e.to_string())
    }

    /// 429 → rate limited; 408 and 5xx → transport; other statuses → rejected.
    pub fn from_status(
        status: reqwest::StatusCode,
        detail: String,
        retry_after: Option<Duration>,
    ) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return SendError::RateLimited { retry_after };
        }
        let detail: String = detail.chars().take(300).collect();
        if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            SendError::Transport(format!("http {status}: {detail}"))
        } else {
            SendError::Rejected(format!("http {status}: {detail}"))
        }
    }
}

impl Transient for SendError {
    fn is_transient(&self) -> bool {
        !matches!(self, SendError::Rejected(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Transport for one channel. Rendering happens before this is called.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, text: &str, format: &ChannelFormat) -> Result<(), SendError>;
    fn channel(&self) -> ChannelId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Delivered,
    Failed,
    Cancelled,
}

/// One digest bound for one channel.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub channel: ChannelId,
    /// Rendered message parts, sent in order.
    pub payload: Vec<String>,
    pub attempt_count: u32,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    pub channel: ChannelId,
    pub batch: usize,
    pub status: JobStatus,
    pub attempts: u32,
    pub parts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NotificationFailure>,
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        self.status == JobStatus::Delivered
    }
}

#[derive(Clone)]
struct ChannelRoute {
    sender: Arc<dyn ChannelSender>,
    format: ChannelFormat,
    policy: RetryPolicy,
    timeout: Duration,
}

#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    routes: Vec<ChannelRoute>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. `retry_count` retries follow the first attempt; `timeout` bounds each send.
    pub fn with_route(
        mut self,
        sender: Arc<dyn ChannelSender>,
        format: ChannelFormat,
        retry_count: u32,
        timeout: Duration,
    ) -> Self {
        self.routes.push(ChannelRoute {
            sender,
            format,
            policy: RetryPolicy::new(retry_count),
            timeout,
        });
        self
    }

    /// Replace every route's backoff shape, keeping each channel's retry count.
    pub fn with_backoff(mut self, policy: RetryPolicy) -> Self {
        for r in &mut self.routes {
            r.policy = RetryPolicy {
                max_retries: r.policy.max_retries,
                ..policy
            };
        }
        self
    }

    /// Routes for enabled channels only. A misconfigured enabled channel is an error.
    pub fn from_config(cfg: &NotificationsConfig, summary: &SummaryConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::client::USER_AGENT)
            .build()?;
        let mut d = Self::new();

        if let Some(tg) = cfg.telegram.as_ref().filter(|c| c.common.enabled) {
            let sender = telegram::TelegramSender::from_config(http.clone(), tg)?;
            d = d.with_route(
                Arc::new(sender),
                ChannelFormat::telegram(&tg.common, summary),
                tg.common.retry_count,
                tg.common.timeout(),
            );
        }
        if let Some(mail) = cfg.email.as_ref().filter(|c| c.common.enabled) {
            let sender = email::EmailSender::from_config(mail)?;
            d = d.with_route(
                Arc::new(sender),
                ChannelFormat::email(&mail.common, summary),
                mail.common.retry_count,
                mail.common.timeout(),
            );
        }
        if let Some(slack) = cfg.slack.as_ref().filter(|c| c.common.enabled) {
            if slack.webhook_url.trim().is_empty() {
                anyhow::bail!("slack needs webhook_url");
            }
            d = d.with_route(
                Arc::new(slack::SlackSender::new(http.clone(), &slack.webhook_url)),
                ChannelFormat::slack(&slack.common, summary),
                slack.common.retry_count,
                slack.common.timeout(),
            );
        }
        if let Some(discord) = cfg.discord.as_ref().filter(|c| c.common.enabled) {
            if discord.webhook_url.trim().is_empty() {
                anyhow::bail!("discord needs webhook_url");
            }
            d = d.with_route(
                Arc::new(discord::DiscordSender::new(http.clone(), &discord.webhook_url)),
                ChannelFormat::discord(&discord.common, summary),
                discord.common.retry_count,
                discord.common.timeout(),
            );
        }
        Ok(d)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.routes.iter().map(|r| r.sender.channel()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Deliver one digest to every channel concurrently. One outcome per channel, in route order.
    pub async fn dispatch(
        &self,
        digest: &SummaryResult,
        cancel: &CancellationToken,
    ) -> Vec<DeliveryOutcome> {
        let mut set = JoinSet::new();
        for (pos, route) in self.routes.iter().cloned().enumerate() {
            let job = NotificationJob {
                channel: route.sender.channel(),
                payload: render(digest, &route.format),
                attempt_count: 0,
                status: JobStatus::Pending,
            };
            let batch = digest.batch;
            let cancel = cancel.clone();
            set.spawn(async move { (pos, deliver(route, job, batch, &cancel).await) });
        }

        let mut out: Vec<(usize, DeliveryOutcome)> = Vec::with_capacity(self.routes.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => out.push(pair),
                Err(e) => tracing::error!(target: "notify", error = %e, "channel task failed"),
            }
        }
        // A panicked task still gets a failed outcome.
        for (pos, route) in self.routes.iter().enumerate() {
            if !out.iter().any(|(p, _)| *p == pos) {
                let channel = route.sender.channel();
                out.push((
                    pos,
                    DeliveryOutcome {
                        channel,
                        batch: digest.batch,
                        status: JobStatus::Failed,
                        attempts: 0,
                        parts: 0,
                        error: Some(NotificationFailure {
                            channel: channel.to_string(),
                            attempts: 0,
                            reason: "channel task aborted".into(),
                        }),
                    },
                ));
            }
        }
        out.sort_by_key(|(p, _)| *p);
        out.into_iter().map(|(_, o)| o).collect()
    }
}

async fn deliver(
    route: ChannelRoute,
    mut job: NotificationJob,
    batch: usize,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    let channel = job.channel;
    let label = format!("notify:{channel}");
    let mut error = None;

    for part in &job.payload {
        let sender = &route.sender;
        let format = &route.format;
        let res = retry(&label, &route.policy, route.timeout, cancel, |_| async move {
            sender.send(part, format).await
        })
        .await;

        match res {
            Ok(done) => job.attempt_count += done.attempts,
            Err(RetryError::Cancelled { attempts }) => {
                job.attempt_count += attempts;
                job.status = JobStatus::Cancelled;
                break;
            }
            Err(err) => {
                job.attempt_count += err.attempts();
                job.status = JobStatus::Failed;
                error = Some(NotificationFailure {
                    channel: channel.to_string(),
                    attempts: job.attempt_count,
                    reason: err.to_string(),
                });
                break;
            }
        }
    }
    if job.status == JobStatus::Pending {
        job.status = JobStatus::Delivered;
    }

    match job.status {
        JobStatus::Delivered => {
            counter!("brief_notify_delivered_total", "channel" => channel.as_str()).increment(1);
            tracing::info!(target: "notify", %channel, batch, parts = job.payload.len(), attempts = job.attempt_count, "digest delivered");
        }
        JobStatus::Failed => {
            counter!("brief_notify_failed_total", "channel" => channel.as_str()).increment(1);
            if let Some(e) = &error {
                tracing::warn!(target: "notify", %channel, batch, error = %e, "delivery failed");
            }
        }
        _ => tracing::info!(target: "notify", %channel, batch, "delivery cancelled"),
    }

    DeliveryOutcome {
        channel,
        batch,
        status: job.status,
        attempts: job.attempt_count,
        parts: job.payload.len(),
        error,
    }
}
