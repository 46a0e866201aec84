// src/ingest/providers/rss.rs
//! RSS 2.0 and Atom decoding.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::RawItem;

/// Element text, ignoring any attributes (`<guid isPermaLink="false">`, `<title type="html">`).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    guid: Option<TextNode>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    id: Option<String>,
    updated: Option<String>,
    published: Option<String>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let unix = OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .unix_timestamp();
    Utc.timestamp_opt(unix, 0).single()
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Feeds in the wild carry either format in `pubDate`.
fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    parse_rfc2822(ts).or_else(|| parse_rfc3339(ts))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Decode an RSS 2.0 or Atom document into raw items, in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<RawItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let items = if looks_like_atom(&xml_clean) {
        parse_atom(&xml_clean)?
    } else {
        parse_rss(&xml_clean)?
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("brief_parse_ms", "kind" => "rss").record(ms);
    counter!("brief_raw_items_total", "kind" => "rss").increment(items.len() as u64);
    Ok(items)
}

fn looks_like_atom(xml: &str) -> bool {
    match (xml.find("<feed"), xml.find("<rss")) {
        (Some(_), None) => true,
        (Some(f), Some(r)) => f < r,
        _ => false,
    }
}

fn parse_rss(xml: &str) -> Result<Vec<RawItem>> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;
    Ok(rss
        .channel
        .item
        .into_iter()
        .map(|it| RawItem {
            source_item_id: it.guid.map(|g| g.value).and_then(|g| non_empty(Some(g))),
            title: non_empty(it.title),
            content: non_empty(it.description),
            url: non_empty(it.link),
            published_at: it.pub_date.as_deref().and_then(parse_feed_date),
            author: non_empty(it.author),
        })
        .collect())
}

fn parse_atom(xml: &str) -> Result<Vec<RawItem>> {
    let feed: AtomFeed = from_str(xml).context("parsing atom xml")?;
    Ok(feed
        .entry
        .into_iter()
        .map(|e| {
            let url = e
                .link
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| e.link.first())
                .map(|l| l.href.clone());
            let published = e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(parse_rfc3339);
            RawItem {
                source_item_id: non_empty(e.id),
                title: non_empty(e.title.map(|t| t.value)),
                content: non_empty(e.summary.or(e.content).map(|t| t.value)),
                url: non_empty(url),
                published_at: published,
                author: non_empty(e.author.and_then(|a| a.name)),
            }
        })
        .collect())
}

/// Reject bodies that are obviously not XML before handing them to the deserializer.
pub fn ensure_xml(body: &str) -> Result<&str> {
    let t = body.trim_start_matches('\u{feff}').trim_start();
    if t.starts_with('<') {
        Ok(t)
    } else {
        Err(anyhow!("feed body is not xml"))
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_and_rfc3339_dates_parse() {
        let a = parse_feed_date("Sat, 06 Sep 2025 09:00:00 +0200").unwrap();
        assert_eq!(a.to_rfc3339(), "2025-09-06T07:00:00+00:00");
        let b = parse_feed_date("2025-09-06T07:00:00Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_feed_date("yesterday").is_none());
    }

    #[test]
    fn minimal_rss_with_missing_fields() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>One&nbsp;item</title><link>https://example.test/1</link></item>
<item><description>no link here</description></item>
</channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("One item"));
        assert!(items[0].published_at.is_none());
        assert!(items[1].url.is_none());
    }

    #[test]
    fn empty_channel_yields_no_items() {
        let xml = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn non_xml_body_is_rejected() {
        assert!(ensure_xml("{\"json\": true}").is_err());
        assert!(ensure_xml("\u{feff}  <rss/>").is_ok());
    }
}
