// src/summarize/mod.rs
//! Summarization queue: token-budgeted batches, a global concurrency ceiling, per-call retry.

pub mod anthropic;
pub mod batch;
pub mod llm;
pub mod prompt;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use batch::{plan_batches, truncate_summary, Batch};
pub use llm::{build_llm_client, DynLlm, LlmClient, LlmError, LlmRequest, StaticLlm};
pub use prompt::Sentiment;

use crate::article::{Article, ArticleId};
use crate::config::{AnthropicConfig, SummaryConfig};
use crate::error::SummarizationFailure;
use crate::retry::{retry, RetryError, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestLink {
    pub title: String,
    pub url: String,
}

/// One digest: the summary of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub batch: usize,
    /// Covered articles, in batch order.
    pub article_ids: Vec<ArticleId>,
    pub summary_text: String,
    pub sentiment: Option<Sentiment>,
    pub language: String,
    pub generated_at: DateTime<Utc>,
    /// Empty unless `include_links` is set.
    pub links: Vec<DigestLink>,
}

#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Summarized(SummaryResult),
    Failed(SummarizationFailure),
    /// Run cancelled before the batch finished.
    Cancelled {
        batch: usize,
        article_ids: Vec<ArticleId>,
    },
}

impl BatchOutcome {
    pub fn batch(&self) -> usize {
        match self {
            BatchOutcome::Summarized(r) => r.batch,
            BatchOutcome::Failed(f) => f.batch,
            BatchOutcome::Cancelled { batch, .. } => *batch,
        }
    }
}

#[derive(Clone)]
pub struct SummarizationQueue {
    llm: DynLlm,
    anthropic: Arc<AnthropicConfig>,
    summary: Arc<SummaryConfig>,
    permits: Arc<Semaphore>,
    backoff: RetryPolicy,
}

impl SummarizationQueue {
    pub fn new(llm: DynLlm, anthropic: &AnthropicConfig, summary: &SummaryConfig) -> Self {
        Self {
            llm,
            permits: Arc::new(Semaphore::new(anthropic.concurrency.max(1))),
            backoff: RetryPolicy::new(anthropic.retry_count).with_base_delay(Duration::from_secs(1)),
            anthropic: Arc::new(anthropic.clone()),
            summary: Arc::new(summary.clone()),
        }
    }

    /// Backoff shape only; the retry count comes from `ai.anthropic.retry_count`.
    pub fn with_backoff(mut self, policy: RetryPolicy) -> Self {
        self.backoff = RetryPolicy {
            max_retries: self.anthropic.retry_count,
            ..policy
        };
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.llm.provider_name()
    }

    /// Summarize `articles` (already deduplicated, in order). Outcomes come back in batch order.
    pub async fn summarize(
        &self,
        articles: Vec<Article>,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        if articles.is_empty() {
            return Vec::new();
        }
        let batches = plan_batches(articles, self.anthropic.batch_budget());
        tracing::info!(target: "summarize", batches = batches.len(), provider = self.provider_name(), "summarizing");

        let mut ids_by_batch: BTreeMap<usize, Vec<ArticleId>> = BTreeMap::new();
        let mut set = JoinSet::new();
        for b in batches {
            ids_by_batch.insert(b.index, b.articles.iter().map(|a| a.id.clone()).collect());
            let this = self.clone();
            let cancel = cancel.clone();
            set.spawn(async move { this.run_batch(b, &cancel).await });
        }

        let mut outcomes = Vec::with_capacity(ids_by_batch.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(o) => {
                    ids_by_batch.remove(&o.batch());
                    outcomes.push(o);
                }
                Err(e) => tracing::error!(target: "summarize", error = %e, "batch task failed"),
            }
        }
        // Tasks that panicked still owe an outcome for their articles.
        for (batch, ids) in ids_by_batch {
            outcomes.push(BatchOutcome::Failed(SummarizationFailure {
                batch,
                article_ids: ids,
                attempts: 0,
                reason: "summarization task aborted".into(),
            }));
        }
        outcomes.sort_by_key(BatchOutcome::batch);
        outcomes
    }

    async fn run_batch(&self, b: Batch, cancel: &CancellationToken) -> BatchOutcome {
        let ids: Vec<ArticleId> = b.articles.iter().map(|a| a.id.clone()).collect();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return BatchOutcome::Cancelled { batch: b.index, article_ids: ids };
            }
            p = self.permits.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => {
                    return BatchOutcome::Cancelled { batch: b.index, article_ids: ids };
                }
            },
        };

        let req = LlmRequest {
            system: prompt::system_prompt(&self.summary),
            prompt: prompt::user_prompt(&b.articles),
            max_tokens: self.anthropic.max_tokens,
            temperature: self.anthropic.temperature,
        };
        let label = format!("summarize#{}", b.index);
        let llm = &self.llm;
        let req_ref = &req;
        let t0 = Instant::now();

        let res = retry(&label, &self.backoff, self.anthropic.timeout(), cancel, |_| async move {
            counter!("brief_llm_calls_total").increment(1);
            llm.complete(req_ref).await
        })
        .await;
        histogram!("brief_llm_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match res {
            Ok(done) => {
                let (body, sentiment) = if self.summary.include_sentiment {
                    prompt::split_sentiment(&done.value)
                } else {
                    (done.value, None)
                };
                let summary_text = truncate_summary(&body, self.summary.max_length);
                let links = if self.summary.include_links {
                    b.articles
                        .iter()
                        .map(|a| DigestLink {
                            title: a.title.clone(),
                            url: a.url.clone(),
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                tracing::info!(
                    target: "summarize",
                    batch = b.index,
                    articles = ids.len(),
                    attempts = done.attempts,
                    chars = summary_text.chars().count(),
                    "batch summarized"
                );
                BatchOutcome::Summarized(SummaryResult {
                    batch: b.index,
                    article_ids: ids,
                    summary_text,
                    sentiment,
                    language: self.summary.language.clone(),
                    generated_at: Utc::now(),
                    links,
                })
            }
            Err(RetryError::Cancelled { .. }) => BatchOutcome::Cancelled {
                batch: b.index,
                article_ids: ids,
            },
            Err(err) => {
                counter!("brief_summary_failures_total").increment(1);
                let failure = SummarizationFailure {
                    batch: b.index,
                    article_ids: ids,
                    attempts: err.attempts(),
                    reason: err.to_string(),
                };
                tracing::warn!(target: "summarize", batch = b.index, error = %failure, "batch failed");
                BatchOutcome::Failed(failure)
            }
        }
    }
}
