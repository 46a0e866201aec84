// src/ingest/normalize.rs
//! RawItem → Article. Deterministic; tolerant of missing optional fields.

use chrono::{DateTime, Utc};

use super::types::RawItem;
use super::{mentions_any, normalize_text, MAX_CONTENT_CHARS, MAX_TITLE_CHARS};
use crate::article::{canonicalize_url, Article, ArticleId};
use crate::config::SourceConfig;
use crate::error::ParseError;

/// Result of normalizing one source's items, in fetch order.
#[derive(Debug, Default)]
pub struct Normalized {
    pub articles: Vec<Article>,
    pub parse_errors: Vec<ParseError>,
    /// Dropped by keyword filters or the per-source cap.
    pub filtered: usize,
}

pub struct Normalizer<'a> {
    source_id: &'a str,
    fetched_at: DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
    pub fn new(source_id: &'a str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id,
            fetched_at,
        }
    }

    pub fn normalize(&self, raw: &RawItem) -> Result<Article, ParseError> {
        let url_raw = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ParseError::MissingUrl {
                source_id: self.source_id.to_string(),
            })?;
        let url = canonicalize_url(url_raw).ok_or_else(|| ParseError::InvalidUrl {
            source_id: self.source_id.to_string(),
            url: url_raw.to_string(),
        })?;

        let title = raw
            .title
            .as_deref()
            .map(|t| normalize_text(t, MAX_TITLE_CHARS))
            .unwrap_or_default();
        let content = raw
            .content
            .as_deref()
            .map(|c| normalize_text(c, MAX_CONTENT_CHARS))
            .unwrap_or_default();
        if title.is_empty() && content.is_empty() {
            return Err(ParseError::Empty {
                source_id: self.source_id.to_string(),
            });
        }
        let title = if title.is_empty() {
            content.chars().take(80).collect()
        } else {
            title
        };

        Ok(Article {
            id: ArticleId::derive(self.source_id, &url),
            source: self.source_id.to_string(),
            title,
            content,
            url,
            published_at: raw.published_at.unwrap_or(self.fetched_at),
            fetched_at: self.fetched_at,
        })
    }

    /// Normalize in order, then apply the source's keyword filters and item cap.
    pub fn normalize_all(&self, cfg: &SourceConfig, items: &[RawItem]) -> Normalized {
        let mut out = Normalized::default();
        for raw in items {
            let article = match self.normalize(raw) {
                Ok(a) => a,
                Err(e) => {
                    tracing::debug!(target: "normalize", source = self.source_id, error = %e, "item dropped");
                    out.parse_errors.push(e);
                    continue;
                }
            };
            let text = format!("{} {}", article.title, article.content);
            if !cfg.keywords.is_empty() && !mentions_any(&text, &cfg.keywords) {
                out.filtered += 1;
                continue;
            }
            if mentions_any(&text, &cfg.exclude_keywords) {
                out.filtered += 1;
                continue;
            }
            if cfg.max_items.is_some_and(|cap| out.articles.len() >= cap) {
                out.filtered += 1;
                continue;
            }
            out.articles.push(article);
        }
        out
    }
}

/// Drop later articles whose titles are near-identical to an earlier one.
/// Returns survivors in order and the number dropped.
pub fn collapse_near_duplicates(articles: Vec<Article>, threshold: f64) -> (Vec<Article>, usize) {
    let mut kept: Vec<Article> = Vec::with_capacity(articles.len());
    let mut kept_titles: Vec<String> = Vec::with_capacity(articles.len());
    let mut dropped = 0usize;
    for a in articles {
        let t = a.title.to_lowercase();
        let dup = kept_titles
            .iter()
            .any(|k| strsim::normalized_levenshtein(k, &t) >= threshold);
        if dup {
            dropped += 1;
            continue;
        }
        kept_titles.push(t);
        kept.push(a);
    }
    (kept, dropped)
}
