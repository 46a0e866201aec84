// src/ingest/fetcher.rs
//! Per-source fetch policy: quota check before every attempt, per-attempt timeout,
//! bounded exponential backoff. Identical for every source kind.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::types::{RawItem, SourceProvider};
use crate::config::SourceConfig;
use crate::error::{RateLimitExceeded, SourceUnavailable};
use crate::ratelimit::RateLimiterRegistry;
use crate::retry::{retry, RetryError, RetryPolicy, Transient};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Fetched { items: usize },
    /// Quota denied; skipped this run, not an error.
    RateLimited(RateLimitExceeded),
    Unavailable(SourceUnavailable),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source_id: String,
    pub status: FetchStatus,
    /// Items in fetch order; empty unless `Fetched`.
    pub items: Vec<RawItem>,
    pub attempts: u32,
    pub fetched_at: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, FetchStatus::Unavailable(_))
    }
}

enum AttemptFailure {
    Denied(RateLimitExceeded),
    Provider(anyhow::Error),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Denied(e) => write!(f, "{e}"),
            AttemptFailure::Provider(e) => write!(f, "{e:#}"),
        }
    }
}

impl Transient for AttemptFailure {
    fn is_transient(&self) -> bool {
        matches!(self, AttemptFailure::Provider(_))
    }
}

#[derive(Clone)]
pub struct SourceFetcher {
    provider: Arc<dyn SourceProvider>,
    limiters: Arc<RateLimiterRegistry>,
    backoff: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(provider: Arc<dyn SourceProvider>, limiters: Arc<RateLimiterRegistry>) -> Self {
        Self {
            provider,
            limiters,
            backoff: RetryPolicy::new(0).with_base_delay(Duration::from_secs(1)),
        }
    }

    /// Backoff shape (base, cap, jitter). The retry count always comes from the source.
    pub fn with_backoff(mut self, policy: RetryPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn limiters(&self) -> &Arc<RateLimiterRegistry> {
        &self.limiters
    }

    pub async fn fetch(&self, cfg: &SourceConfig, cancel: &CancellationToken) -> FetchOutcome {
        let t0 = Instant::now();
        let policy = RetryPolicy {
            max_retries: cfg.retry_count,
            ..self.backoff
        };
        let provider = &self.provider;
        let limiters = &self.limiters;
        let source = cfg.name.as_str();

        let res = retry(source, &policy, cfg.timeout(), cancel, |attempt| async move {
            limiters.acquire(source).map_err(AttemptFailure::Denied)?;
            counter!("brief_fetch_attempts_total", "source" => source.to_string()).increment(1);
            tracing::debug!(target: "fetch", source, attempt, provider = provider.name(), "fetch attempt");
            provider
                .fetch_latest(cfg)
                .await
                .map_err(AttemptFailure::Provider)
        })
        .await;

        histogram!("brief_fetch_ms", "source" => source.to_string())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        let fetched_at = Utc::now();

        let (status, items, attempts) = match res {
            Ok(done) => {
                tracing::info!(
                    target: "fetch",
                    source,
                    items = done.value.len(),
                    attempts = done.attempts,
                    "source fetched"
                );
                (
                    FetchStatus::Fetched {
                        items: done.value.len(),
                    },
                    done.value,
                    done.attempts,
                )
            }
            Err(RetryError::Aborted {
                attempts,
                error: AttemptFailure::Denied(denied),
            }) => {
                tracing::info!(target: "fetch", source, resets_at = %denied.resets_at, "quota exhausted, skipping source");
                counter!("brief_fetch_rate_limited_total", "source" => source.to_string())
                    .increment(1);
                (FetchStatus::RateLimited(denied), Vec::new(), attempts)
            }
            Err(RetryError::Cancelled { attempts }) => {
                tracing::info!(target: "fetch", source, attempts, "fetch cancelled");
                (FetchStatus::Cancelled, Vec::new(), attempts)
            }
            Err(err) => {
                let attempts = err.attempts();
                let unavailable = SourceUnavailable {
                    source_id: source.to_string(),
                    attempts,
                    reason: err.to_string(),
                };
                tracing::warn!(target: "fetch", source, attempts, error = %unavailable.reason, "source unavailable");
                counter!("brief_source_unavailable_total", "source" => source.to_string())
                    .increment(1);
                (FetchStatus::Unavailable(unavailable), Vec::new(), attempts)
            }
        };

        FetchOutcome {
            source_id: cfg.name.clone(),
            status,
            items,
            attempts,
            fetched_at,
        }
    }
}
