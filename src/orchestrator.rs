// src/orchestrator.rs
//! Run lifecycle: Idle → Fetching → Normalizing → Summarizing → Notifying → Idle.
//! Each phase is a fan-in barrier; unit failures are recorded, never awaited forever.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::article::ArticleId;
use crate::config::{AppConfig, SourceConfig};
use crate::dedup::DedupStore;
use crate::error::{BriefError, SourceUnavailable};
use crate::history::{RunHistory, DEFAULT_CAPACITY};
use crate::ingest::normalize::collapse_near_duplicates;
use crate::ingest::{FetchOutcome, FetchStatus, HttpSourceProvider, Normalizer, SourceFetcher};
use crate::notify::{DeliveryOutcome, JobStatus, NotificationDispatcher};
use crate::ratelimit::RateLimiterRegistry;
use crate::report::{RunReport, RunStatus, SourceReport};
use crate::summarize::{BatchOutcome, DynLlm, SummarizationQueue};

pub const LIMITS_FILE: &str = "ratelimits.json";
pub const SEEN_FILE: &str = "seen.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    Normalizing,
    Summarizing,
    Notifying,
}

/// Puts the phase back to `Idle` however the run ends.
struct PhaseGuard<'a>(&'a Mutex<Phase>);

impl PhaseGuard<'_> {
    fn enter(&self, p: Phase) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = p;
        tracing::debug!(target: "pipeline", phase = ?p, "phase");
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Phase::Idle;
    }
}

pub struct PipelineOrchestrator {
    sources: Vec<Arc<SourceConfig>>,
    fetcher: SourceFetcher,
    dedup: Arc<DedupStore>,
    summarizer: SummarizationQueue,
    dispatcher: NotificationDispatcher,
    history: Arc<RunHistory>,
    title_similarity: Option<f64>,
    requeue_failed: bool,
    state_dir: Option<PathBuf>,
    phase: Mutex<Phase>,
    run_lock: tokio::sync::Mutex<()>,
    run_seq: AtomicU64,
}

impl PipelineOrchestrator {
    /// `sources` are the enabled sources, in run order.
    pub fn new(
        sources: Vec<SourceConfig>,
        fetcher: SourceFetcher,
        dedup: Arc<DedupStore>,
        summarizer: SummarizationQueue,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            fetcher,
            dedup,
            summarizer,
            dispatcher,
            history: Arc::new(RunHistory::default()),
            title_similarity: None,
            requeue_failed: true,
            state_dir: None,
            phase: Mutex::new(Phase::Idle),
            run_lock: tokio::sync::Mutex::new(()),
            run_seq: AtomicU64::new(0),
        }
    }

    pub fn with_history(mut self, history: Arc<RunHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_title_similarity(mut self, threshold: Option<f64>) -> Self {
        self.title_similarity = threshold;
        self
    }

    pub fn with_requeue_failed(mut self, on: bool) -> Self {
        self.requeue_failed = on;
        self
    }

    /// Persist limiter and dedup state here after every run.
    pub fn with_state_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.state_dir = dir;
        self
    }

    /// Wire the default collaborators from configuration and restore saved state.
    pub fn from_config(cfg: &AppConfig, llm: DynLlm) -> anyhow::Result<Self> {
        let sources = cfg.enabled_sources();
        let limiters = Arc::new(RateLimiterRegistry::from_sources(&sources));
        let dedup = Arc::new(DedupStore::with_retention_days(cfg.dedup.retention_days));

        if let Some(dir) = &cfg.pipeline.state_dir {
            restore_state(dir, &limiters, &dedup);
        }

        let provider = Arc::new(HttpSourceProvider::new()?);
        let fetcher = SourceFetcher::new(provider, limiters);
        let summarizer = SummarizationQueue::new(llm, &cfg.ai.anthropic, &cfg.ai.summary);
        let dispatcher = NotificationDispatcher::from_config(&cfg.notifications, &cfg.ai.summary)?;
        if dispatcher.is_empty() {
            tracing::warn!(target: "pipeline", "no notification channel enabled");
        }
        let history = Arc::new(RunHistory::with_capacity(
            cfg.pipeline.history_capacity.unwrap_or(DEFAULT_CAPACITY),
        ));

        Ok(Self::new(sources, fetcher, dedup, summarizer, dispatcher)
            .with_history(history)
            .with_title_similarity(cfg.dedup.title_similarity)
            .with_requeue_failed(cfg.pipeline.requeue_failed)
            .with_state_dir(cfg.pipeline.state_dir.clone()))
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn history(&self) -> Arc<RunHistory> {
        self.history.clone()
    }

    pub fn dedup(&self) -> &Arc<DedupStore> {
        &self.dedup
    }

    pub fn channels(&self) -> Vec<crate::notify::ChannelId> {
        self.dispatcher.channels()
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// One full pass. Fails only when another run is active or the dedup store is broken.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, BriefError> {
        let _running = self
            .run_lock
            .try_lock()
            .map_err(|_| BriefError::RunInProgress)?;
        let phase = PhaseGuard(&self.phase);
        let run_id = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        tracing::info!(target: "pipeline", run_id, sources = self.sources.len(), "run started");

        // Fetching
        phase.enter(Phase::Fetching);
        let outcomes = self.fetch_all(cancel).await;

        // Normalizing
        phase.enter(Phase::Normalizing);
        let mut source_reports = Vec::with_capacity(outcomes.len());
        let mut candidates = Vec::new();
        for (cfg, outcome) in self.sources.iter().zip(outcomes) {
            let normalized = Normalizer::new(&cfg.name, outcome.fetched_at)
                .normalize_all(cfg, &outcome.items);
            source_reports.push(SourceReport {
                source: cfg.name.clone(),
                kind: cfg.kind.label(),
                outcome: outcome.status,
                attempts: outcome.attempts,
                articles: normalized.articles.len(),
                parse_errors: normalized.parse_errors.len(),
                filtered: normalized.filtered,
            });
            candidates.extend(normalized.articles);
        }
        let candidate_count = candidates.len();
        let admitted = self.dedup.admit(candidates, Utc::now())?;
        let duplicates = candidate_count - admitted.len();
        let (fresh, near_duplicates) = match self.title_similarity {
            Some(t) => collapse_near_duplicates(admitted, t),
            None => (admitted, 0),
        };
        counter!("brief_new_articles_total").increment(fresh.len() as u64);
        let new_articles = fresh.len();

        // Summarizing
        phase.enter(Phase::Summarizing);
        let mut requeue: Vec<ArticleId> = Vec::new();
        let batch_outcomes = if cancel.is_cancelled() {
            requeue.extend(fresh.iter().map(|a| a.id.clone()));
            Vec::new()
        } else {
            self.summarizer.summarize(fresh, cancel).await
        };

        let mut digests = Vec::new();
        let mut summary_failures = Vec::new();
        let mut batches_cancelled = 0usize;
        for o in batch_outcomes {
            match o {
                BatchOutcome::Summarized(r) => digests.push(r),
                BatchOutcome::Failed(f) => {
                    requeue.extend(f.article_ids.iter().cloned());
                    summary_failures.push(f);
                }
                BatchOutcome::Cancelled { article_ids, .. } => {
                    batches_cancelled += 1;
                    requeue.extend(article_ids);
                }
            }
        }

        // Notifying
        phase.enter(Phase::Notifying);
        let mut deliveries: Vec<DeliveryOutcome> = Vec::new();
        for digest in &digests {
            if cancel.is_cancelled() {
                requeue.extend(digest.article_ids.iter().cloned());
                continue;
            }
            let outcomes = self.dispatcher.dispatch(digest, cancel).await;
            if !outcomes.is_empty() && outcomes.iter().all(|d| d.status == JobStatus::Cancelled) {
                requeue.extend(digest.article_ids.iter().cloned());
            }
            deliveries.extend(outcomes);
        }

        let requeued = if self.requeue_failed && !requeue.is_empty() {
            self.dedup.forget(&requeue)?
        } else {
            0
        };

        let delivered = deliveries.iter().filter(|d| d.delivered()).count();
        let failed_sources = source_reports
            .iter()
            .filter(|s| matches!(s.outcome, FetchStatus::Unavailable(_)))
            .count();
        let status = RunStatus::decide(
            cancel.is_cancelled(),
            self.sources.len(),
            failed_sources,
            new_articles,
            delivered,
        );

        if let Some(dir) = &self.state_dir {
            self.persist_state(dir.clone()).await;
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            sources: source_reports,
            new_articles,
            duplicates,
            near_duplicates,
            batches_summarized: digests.len(),
            summary_failures,
            batches_cancelled,
            requeued,
            deliveries,
        };
        counter!("brief_runs_total", "status" => status.as_str()).increment(1);
        tracing::info!(
            target: "pipeline",
            run_id,
            %status,
            new_articles,
            digests = report.batches_summarized,
            delivered,
            "run finished"
        );
        self.history.push(report.clone());
        Ok(report)
    }

    /// One task per source; outcomes come back in source order.
    async fn fetch_all(&self, cancel: &CancellationToken) -> Vec<FetchOutcome> {
        let mut set = JoinSet::new();
        for (idx, cfg) in self.sources.iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let cfg = cfg.clone();
            let cancel = cancel.clone();
            set.spawn(async move { (idx, fetcher.fetch(&cfg, &cancel).await) });
        }

        let mut slots: Vec<Option<FetchOutcome>> = vec![None; self.sources.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => tracing::error!(target: "pipeline", error = %e, "fetch task failed"),
            }
        }
        slots
            .into_iter()
            .zip(&self.sources)
            .map(|(slot, cfg)| {
                slot.unwrap_or_else(|| FetchOutcome {
                    source_id: cfg.name.clone(),
                    status: FetchStatus::Unavailable(SourceUnavailable {
                        source_id: cfg.name.clone(),
                        attempts: 0,
                        reason: "fetch task aborted".into(),
                    }),
                    items: Vec::new(),
                    attempts: 0,
                    fetched_at: Utc::now(),
                })
            })
            .collect()
    }

    async fn persist_state(&self, dir: PathBuf) {
        let limiters = self.fetcher.limiters().clone();
        let dedup = self.dedup.clone();
        let saved = tokio::task::spawn_blocking(move || {
            if let Err(e) = limiters.save_to(&dir.join(LIMITS_FILE)) {
                tracing::warn!(target: "pipeline", error = %e, "saving rate limiter state failed");
            }
            if let Err(e) = dedup.save_to(&dir.join(SEEN_FILE)) {
                tracing::warn!(target: "pipeline", error = %e, "saving dedup state failed");
            }
        })
        .await;
        if let Err(e) = saved {
            tracing::warn!(target: "pipeline", error = %e, "state writer task failed");
        }
    }
}

fn restore_state(dir: &Path, limiters: &RateLimiterRegistry, dedup: &DedupStore) {
    if let Err(e) = limiters.load_from(&dir.join(LIMITS_FILE)) {
        tracing::warn!(target: "pipeline", error = %e, "rate limiter state not restored");
    }
    match dedup.load_from(&dir.join(SEEN_FILE)) {
        Ok(n) if n > 0 => tracing::info!(target: "pipeline", seen = n, "dedup state restored"),
        Ok(_) => {}
        Err(e) => tracing::warn!(target: "pipeline", error = %e, "dedup state not restored"),
    }
}
