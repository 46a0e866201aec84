// src/ingest/client.rs
//! HTTP transport shared by every source kind.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::providers::{newsapi, reddit, rss};
use super::types::{RawItem, SourceProvider};
use crate::config::{SourceConfig, SourceKind};

pub const USER_AGENT: &str = "news-brief-bot/0.1 (+https://github.com/news-brief-bot)";

/// One `reqwest::Client` for all sources; the per-attempt deadline is set per request.
#[derive(Clone)]
pub struct HttpSourceProvider {
    http: reqwest::Client,
}

impl HttpSourceProvider {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building http client")?;
        Ok(Self { http })
    }

    fn get(&self, cfg: &SourceConfig, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url).timeout(cfg.timeout());
        for (k, v) in &cfg.custom_headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }

    async fn body(&self, req: reqwest::RequestBuilder) -> Result<String> {
        let resp = req.send().await.context("sending request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("http status {status}");
        }
        resp.text().await.context("reading body")
    }

    async fn fetch_newsapi(
        &self,
        cfg: &SourceConfig,
        base_url: &str,
        api_key: &str,
        query: Option<&str>,
        language: &str,
        page_size: u32,
    ) -> Result<Vec<RawItem>> {
        if api_key.is_empty() {
            bail!("newsapi api_key is not set");
        }
        let mut params: Vec<(&str, String)> = vec![
            ("language", language.to_string()),
            ("pageSize", page_size.to_string()),
            ("sortBy", "publishedAt".to_string()),
        ];
        if let Some(q) = newsapi::build_query(query, &cfg.keywords) {
            params.push(("q", q));
        }
        let req = self
            .get(cfg, base_url)
            .query(&params)
            .header("Authorization", api_key);
        let body = self.body(req).await?;
        newsapi::parse_response(&body)
    }

    async fn fetch_reddit(
        &self,
        cfg: &SourceConfig,
        base_url: &str,
        subreddits: &[String],
        sort: &str,
        limit: u32,
    ) -> Result<Vec<RawItem>> {
        let mut out = Vec::new();
        for sub in subreddits {
            let url = reddit::listing_url(base_url, sub, sort, limit);
            let body = self.body(self.get(cfg, &url)).await?;
            out.extend(reddit::parse_listing(base_url, &body)?);
        }
        Ok(out)
    }

    /// A multi-feed source fails only if every feed fails.
    async fn fetch_rss(&self, cfg: &SourceConfig, feeds: &[String]) -> Result<Vec<RawItem>> {
        let mut out = Vec::new();
        let mut last_err = None;
        let mut ok_feeds = 0usize;
        for feed in feeds {
            let res = async {
                let body = self.body(self.get(cfg, feed)).await?;
                rss::parse_feed(rss::ensure_xml(&body)?)
            }
            .await;
            match res {
                Ok(items) => {
                    ok_feeds += 1;
                    out.extend(items);
                }
                Err(e) => {
                    tracing::warn!(target: "fetch", source = %cfg.name, feed = %feed, error = %format!("{e:#}"), "feed failed");
                    last_err = Some(e);
                }
            }
        }
        match (ok_feeds, last_err) {
            (0, Some(e)) => Err(e.context(format!("all {} feeds failed", feeds.len()))),
            (0, None) => Err(anyhow!("no feeds configured")),
            _ => Ok(out),
        }
    }
}

#[async_trait]
impl SourceProvider for HttpSourceProvider {
    async fn fetch_latest(&self, cfg: &SourceConfig) -> Result<Vec<RawItem>> {
        match &cfg.kind {
            SourceKind::NewsApi {
                base_url,
                api_key,
                query,
                language,
                page_size,
            } => {
                self.fetch_newsapi(cfg, base_url, api_key, query.as_deref(), language, *page_size)
                    .await
            }
            SourceKind::Reddit {
                base_url,
                subreddits,
                sort,
                limit,
            } => {
                self.fetch_reddit(cfg, base_url, subreddits, sort, *limit)
                    .await
            }
            SourceKind::Rss { feeds } => self.fetch_rss(cfg, feeds).await,
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
