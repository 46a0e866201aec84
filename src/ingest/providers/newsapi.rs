// src/ingest/providers/newsapi.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::types::RawItem;

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Value>,
}

/// `q` parameter: explicit query wins, otherwise keywords OR-ed together.
pub fn build_query(query: Option<&str>, keywords: &[String]) -> Option<String> {
    if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
        return Some(q.to_string());
    }
    let joined = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ");
    (!joined.is_empty()).then_some(joined)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Decode an `everything` response. A single malformed article never fails the batch.
pub fn parse_response(body: &str) -> Result<Vec<RawItem>> {
    let env: Envelope = serde_json::from_str(body).context("parsing newsapi json")?;
    if env.status != "ok" {
        bail!(
            "newsapi error {}: {}",
            env.code.as_deref().unwrap_or("unknown"),
            env.message.as_deref().unwrap_or("")
        );
    }

    let items: Vec<RawItem> = env
        .articles
        .iter()
        .filter(|a| a.is_object())
        .map(|a| RawItem {
            source_item_id: None,
            title: str_field(a, "title"),
            content: str_field(a, "description").or_else(|| str_field(a, "content")),
            url: str_field(a, "url"),
            published_at: str_field(a, "publishedAt")
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|d| d.with_timezone(&Utc)),
            author: str_field(a, "author"),
        })
        .collect();
    counter!("brief_raw_items_total", "kind" => "news_api").increment(items.len() as u64);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_prefers_explicit_then_keywords() {
        let kws = vec!["rust".to_string(), " ".to_string(), "tokio".to_string()];
        assert_eq!(build_query(Some("llm"), &kws).as_deref(), Some("llm"));
        assert_eq!(build_query(None, &kws).as_deref(), Some("rust OR tokio"));
        assert_eq!(build_query(Some(""), &[]), None);
    }

    #[test]
    fn error_envelope_fails_the_attempt() {
        let body = r#"{"status":"error","code":"rateLimited","message":"too many"}"#;
        let err = parse_response(body).unwrap_err().to_string();
        assert!(err.contains("rateLimited"));
    }

    #[test]
    fn tolerates_nulls_and_garbage_entries() {
        let body = r#"{"status":"ok","totalResults":2,"articles":[
            {"title":"A","description":null,"content":"body","url":"https://n.test/a","publishedAt":"2025-09-06T07:00:00Z"},
            42,
            {"title":null,"url":"https://n.test/b","publishedAt":"not a date"}
        ]}"#;
        let items = parse_response(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content.as_deref(), Some("body"));
        assert!(items[0].published_at.is_some());
        assert!(items[1].title.is_none());
        assert!(items[1].published_at.is_none());
    }
}
