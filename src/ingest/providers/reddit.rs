// src/ingest/providers/reddit.rs
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use metrics::counter;
use serde_json::Value;

use crate::ingest::types::RawItem;

/// `{base}/r/{sub}/{sort}.json?limit=N`
pub fn listing_url(base_url: &str, subreddit: &str, sort: &str, limit: u32) -> String {
    format!(
        "{}/r/{}/{}.json?limit={}",
        base_url.trim_end_matches('/'),
        subreddit.trim().trim_start_matches("r/"),
        sort,
        limit
    )
}

fn text(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Decode a listing. Self posts link to their permalink, link posts to their target.
pub fn parse_listing(base_url: &str, body: &str) -> Result<Vec<RawItem>> {
    let root: Value = serde_json::from_str(body).context("parsing reddit json")?;
    let children = root
        .pointer("/data/children")
        .and_then(Value::as_array)
        .context("reddit listing without data.children")?;

    let base = base_url.trim_end_matches('/');
    let items: Vec<RawItem> = children
        .iter()
        .filter_map(|c| c.get("data"))
        .map(|post| {
            let permalink = text(post, "permalink").map(|p| format!("{base}{p}"));
            let is_self = post.get("is_self").and_then(Value::as_bool).unwrap_or(false);
            let url = if is_self {
                permalink
            } else {
                text(post, "url").or(permalink)
            };
            RawItem {
                source_item_id: text(post, "id"),
                title: text(post, "title"),
                content: text(post, "selftext"),
                url,
                published_at: post
                    .get("created_utc")
                    .and_then(Value::as_f64)
                    .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
                author: text(post, "author"),
            }
        })
        .collect();
    counter!("brief_raw_items_total", "kind" => "reddit").increment(items.len() as u64);
    Ok(items)
}
