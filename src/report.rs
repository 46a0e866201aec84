// src/report.rs
//! What a run did, per unit. Rendered for humans via `Display`, for machines via serde.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::SummarizationFailure;
use crate::ingest::FetchStatus;
use crate::notify::DeliveryOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// At least one digest reached at least one channel.
    Succeeded,
    /// Every enabled source failed, or nothing could be delivered.
    Degraded,
    /// Sources answered but produced no new article.
    NoNews,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Degraded => "degraded",
            RunStatus::NoNews => "no_news",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal status from the run's counts.
    pub fn decide(
        cancelled: bool,
        enabled_sources: usize,
        failed_sources: usize,
        new_articles: usize,
        delivered: usize,
    ) -> Self {
        if delivered > 0 {
            RunStatus::Succeeded
        } else if cancelled {
            RunStatus::Cancelled
        } else if enabled_sources == 0 || failed_sources == enabled_sources {
            RunStatus::Degraded
        } else if new_articles == 0 {
            RunStatus::NoNews
        } else {
            RunStatus::Degraded
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: &'static str,
    pub outcome: FetchStatus,
    pub attempts: u32,
    /// Articles kept after normalization and topic filters.
    pub articles: usize,
    pub parse_errors: usize,
    pub filtered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub sources: Vec<SourceReport>,
    /// Articles that passed dedup and near-duplicate collapse.
    pub new_articles: usize,
    pub duplicates: usize,
    pub near_duplicates: usize,
    pub batches_summarized: usize,
    pub summary_failures: Vec<SummarizationFailure>,
    pub batches_cancelled: usize,
    /// Articles returned to the unseen pool for the next run.
    pub requeued: usize,
    pub deliveries: Vec<DeliveryOutcome>,
}

impl RunReport {
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.delivered()).count()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, FetchStatus::Unavailable(_)))
            .count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        writeln!(f, "run #{} {} in {:.1}s", self.run_id, self.status, secs)?;
        for s in &self.sources {
            let state = match &s.outcome {
                FetchStatus::Fetched { items } => format!("fetched {items} item(s)"),
                FetchStatus::RateLimited(e) => format!("rate limited until {}", e.resets_at),
                FetchStatus::Unavailable(e) => format!("unavailable: {}", e.reason),
                FetchStatus::Cancelled => "cancelled".to_string(),
            };
            writeln!(
                f,
                "  source {:<16} {:<8} {} ({} attempt(s), {} kept, {} parse error(s), {} filtered)",
                s.source, s.kind, state, s.attempts, s.articles, s.parse_errors, s.filtered
            )?;
        }
        writeln!(
            f,
            "  articles: {} new, {} duplicate(s), {} near-duplicate(s), {} requeued",
            self.new_articles, self.duplicates, self.near_duplicates, self.requeued
        )?;
        writeln!(
            f,
            "  summaries: {} ok, {} failed, {} cancelled",
            self.batches_summarized,
            self.summary_failures.len(),
            self.batches_cancelled
        )?;
        for fail in &self.summary_failures {
            writeln!(f, "    {fail}")?;
        }
        for d in &self.deliveries {
            match &d.error {
                Some(e) => writeln!(f, "  {} batch {}: {:?} ({e})", d.channel, d.batch, d.status)?,
                None => writeln!(
                    f,
                    "  {} batch {}: {:?} ({} part(s), {} attempt(s))",
                    d.channel, d.batch, d.status, d.parts, d.attempts
                )?,
            }
        }
        Ok(())
    }
}
