// src/error.rs
//! Failure taxonomy. Unit-level failures (source, item, batch, channel) are values that end up
//! in the run report; only `BriefError` ever aborts a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::article::ArticleId;
use crate::config::QuotaUnit;

/// Quota denied for this window. The caller skips the source; this is not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("rate limit exceeded for `{source_id}`: quota {quota} {unit}, resets at {resets_at}")]
pub struct RateLimitExceeded {
    pub source_id: String,
    pub quota: u32,
    pub unit: QuotaUnit,
    pub resets_at: DateTime<Utc>,
}

/// Fetch exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("source `{source_id}` unavailable after {attempts} attempt(s): {reason}")]
pub struct SourceUnavailable {
    pub source_id: String,
    pub attempts: u32,
    pub reason: String,
}

/// A raw item that cannot become an article. The item is dropped, the source continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ParseError {
    #[error("item from `{source_id}` has no url")]
    MissingUrl { source_id: String },
    #[error("item from `{source_id}` has an invalid url `{url}`")]
    InvalidUrl { source_id: String, url: String },
    #[error("item from `{source_id}` has neither title nor content")]
    Empty { source_id: String },
}

/// LLM call exhausted its retries or was rejected; the batch is dropped from the digest.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("batch {batch} ({} article(s)) failed after {attempts} attempt(s): {reason}", .article_ids.len())]
pub struct SummarizationFailure {
    pub batch: usize,
    pub article_ids: Vec<ArticleId>,
    pub attempts: u32,
    pub reason: String,
}

/// Channel send exhausted its retries; other channels are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("channel `{channel}` failed after {attempts} attempt(s): {reason}")]
pub struct NotificationFailure {
    pub channel: String,
    pub attempts: u32,
    pub reason: String,
}

/// Dedup store consistency problems. Any of these halts the current run.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("dedup store lock poisoned by a panicking writer")]
    Poisoned,
    #[error("dedup store inconsistent: expected {expected} ids after insert, found {actual}")]
    Inconsistent { expected: usize, actual: usize },
    #[error("dedup snapshot unreadable: {0}")]
    Snapshot(String),
}

#[derive(Debug, Error)]
pub enum BriefError {
    #[error("a pipeline run is already in progress")]
    RunInProgress,
    #[error("dedup invariant violated: {0}")]
    Dedup(#[from] DedupError),
}
