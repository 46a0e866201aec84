// tests/common/mod.rs
//
// In-process collaborators shared by the integration tests: a scripted source
// provider and a recording channel sender. No network, no real LLM.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use news_brief_bot::config::{AnthropicConfig, SourceConfig, SourceKind, SummaryConfig};
use news_brief_bot::dedup::DedupStore;
use news_brief_bot::ingest::{RawItem, SourceFetcher, SourceProvider};
use news_brief_bot::notify::{
    ChannelFormat, ChannelId, ChannelSender, NotificationDispatcher, SendError,
};
use news_brief_bot::ratelimit::RateLimiterRegistry;
use news_brief_bot::retry::RetryPolicy;
use news_brief_bot::summarize::{DynLlm, SummarizationQueue};
use news_brief_bot::PipelineOrchestrator;

/// What a scripted source does on every attempt.
#[derive(Clone)]
pub enum Script {
    Items(Vec<RawItem>),
    Fail(&'static str),
    /// Never answers; only the per-attempt timeout ends it.
    Hang,
    /// Waits for `release` before answering with the items.
    Gate(Arc<Notify>, Vec<RawItem>),
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, source: &str, script: Script) -> Self {
        self.scripts.lock().insert(source.to_string(), script);
        self
    }

    pub fn set(&self, source: &str, script: Script) {
        self.scripts.lock().insert(source.to_string(), script);
    }

    pub fn calls(&self, source: &str) -> u32 {
        self.calls.lock().get(source).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    async fn fetch_latest(&self, cfg: &SourceConfig) -> anyhow::Result<Vec<RawItem>> {
        *self.calls.lock().entry(cfg.name.clone()).or_default() += 1;
        let script = self.scripts.lock().get(&cfg.name).cloned();
        match script {
            Some(Script::Items(items)) => Ok(items),
            Some(Script::Fail(msg)) => anyhow::bail!("{msg}"),
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Gate(gate, items)) => {
                gate.notified().await;
                Ok(items)
            }
            None => anyhow::bail!("no script for {}", cfg.name),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every message part it is asked to send.
pub struct RecordingSender {
    channel: ChannelId,
    fail_with: Option<fn() -> SendError>,
    /// Cancels this token on send, then never answers.
    cancels: Option<CancellationToken>,
    attempts: AtomicU32,
    pub sent: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn ok(channel: ChannelId) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail_with: None,
            cancels: None,
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(channel: ChannelId, err: fn() -> SendError) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail_with: Some(err),
            cancels: None,
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn cancelling(channel: ChannelId, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail_with: None,
            cancels: Some(token),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, text: &str, _format: &ChannelFormat) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancels {
            token.cancel();
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.fail_with {
            return Err(err());
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }
}

pub fn rss_source(name: &str) -> SourceConfig {
    SourceConfig::new(
        name,
        SourceKind::Rss {
            feeds: vec![format!("https://{name}.test/rss.xml")],
        },
    )
    .with_retries(0)
}

pub fn items(prefix: &str, n: usize) -> Vec<RawItem> {
    (1..=n)
        .map(|i| {
            RawItem::new(
                format!("{prefix} headline number {i}"),
                format!("https://{prefix}.test/story/{i}"),
            )
            .with_content(format!("Body of {prefix} story {i}."))
        })
        .collect()
}

pub fn no_backoff() -> RetryPolicy {
    RetryPolicy::new(0).with_base_delay(Duration::ZERO).with_jitter(false)
}

pub fn fetcher(provider: Arc<dyn SourceProvider>, sources: &[SourceConfig]) -> SourceFetcher {
    let limiters = Arc::new(RateLimiterRegistry::from_sources(sources));
    SourceFetcher::new(provider, limiters).with_backoff(no_backoff())
}

pub fn dispatcher(senders: Vec<Arc<RecordingSender>>, retry_count: u32) -> NotificationDispatcher {
    senders
        .into_iter()
        .fold(NotificationDispatcher::new(), |d, s| {
            d.with_route(s, ChannelFormat::plain(), retry_count, Duration::from_secs(5))
        })
        .with_backoff(no_backoff())
}

pub fn summarizer(llm: DynLlm, retry_count: u32) -> SummarizationQueue {
    let cfg = AnthropicConfig {
        retry_count,
        ..AnthropicConfig::default()
    };
    SummarizationQueue::new(llm, &cfg, &SummaryConfig::default()).with_backoff(no_backoff())
}

pub fn orchestrator(
    sources: Vec<SourceConfig>,
    provider: Arc<ScriptedProvider>,
    llm: DynLlm,
    senders: Vec<Arc<RecordingSender>>,
) -> PipelineOrchestrator {
    let fetcher = fetcher(provider, &sources);
    PipelineOrchestrator::new(
        sources,
        fetcher,
        Arc::new(DedupStore::new()),
        summarizer(llm, 0),
        dispatcher(senders, 0),
    )
}
