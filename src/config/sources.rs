// src/config/sources.rs
//! Per-source configuration. Source heterogeneity is a tagged enum (`kind = "..."`)
//! flattened into the common fields, so every source goes through one fetch contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_enabled() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_count() -> u32 {
    3
}
fn default_newsapi_base() -> String {
    "https://newsapi.org/v2/everything".to_string()
}
fn default_reddit_base() -> String {
    "https://www.reddit.com".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_page_size() -> u32 {
    20
}
fn default_reddit_sort() -> String {
    "new".to_string()
}
fn default_reddit_limit() -> u32 {
    25
}

/// Window over which a source's quota is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaUnit {
    PerDay,
    PerMinute,
}

impl std::fmt::Display for QuotaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaUnit::PerDay => f.write_str("per day"),
            QuotaUnit::PerMinute => f.write_str("per minute"),
        }
    }
}

/// Kind-specific parameters. Only request construction and decoding differ by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Paid news API (NewsAPI `everything` endpoint).
    NewsApi {
        #[serde(default = "default_newsapi_base")]
        base_url: String,
        /// `"ENV"` resolves from `NEWSAPI_API_KEY`.
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        query: Option<String>,
        #[serde(default = "default_language")]
        language: String,
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
    /// Social platform listing (Reddit JSON).
    Reddit {
        #[serde(default = "default_reddit_base")]
        base_url: String,
        subreddits: Vec<String>,
        #[serde(default = "default_reddit_sort")]
        sort: String,
        #[serde(default = "default_reddit_limit")]
        limit: u32,
    },
    /// RSS 2.0 or Atom feeds.
    Rss { feeds: Vec<String> },
}

impl SourceKind {
    /// API-key sources count per day, high-volume sources per minute.
    pub fn default_quota_unit(&self) -> QuotaUnit {
        match self {
            SourceKind::NewsApi { .. } => QuotaUnit::PerDay,
            SourceKind::Reddit { .. } | SourceKind::Rss { .. } => QuotaUnit::PerMinute,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::NewsApi { .. } => "news_api",
            SourceKind::Reddit { .. } => "reddit",
            SourceKind::Rss { .. } => "rss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Filled from the table key by the loader.
    #[serde(skip)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Absent means unlimited; `0` denies every call.
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub rate_limit_unit: Option<QuotaUnit>,
    /// Seconds per attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    /// Keep only items mentioning any of these (empty keeps all).
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceConfig {
    /// Minimal config, mostly for tests and demos.
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            rate_limit: None,
            rate_limit_unit: None,
            timeout: default_timeout_secs(),
            retry_count: default_retry_count(),
            custom_headers: BTreeMap::new(),
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            max_items: None,
            kind,
        }
    }

    pub fn quota_unit(&self) -> QuotaUnit {
        self.rate_limit_unit
            .unwrap_or_else(|| self.kind.default_quota_unit())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    pub fn with_rate_limit(mut self, limit: u32, unit: QuotaUnit) -> Self {
        self.rate_limit = Some(limit);
        self.rate_limit_unit = Some(unit);
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }
}
