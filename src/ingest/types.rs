// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;

/// Item as decoded from a source, before normalization. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub source_item_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

impl RawItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Transport + decode for one source. Retry, timeout and quota live in the fetcher.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// One attempt. Items come back in the source's own order.
    async fn fetch_latest(&self, cfg: &SourceConfig) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}
