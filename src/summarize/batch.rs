// src/summarize/batch.rs
//! Token-budgeted batch planning and output truncation.

use crate::article::Article;

/// Fixed cost per article for separators, numbering and the link line.
pub const PER_ARTICLE_OVERHEAD: u32 = 16;

/// Rough token estimate: four characters per token.
pub fn estimate_chars(chars: usize) -> u32 {
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

pub fn estimate_tokens(a: &Article) -> u32 {
    let chars = a.title.chars().count() + a.content.chars().count() + a.url.chars().count();
    estimate_chars(chars).saturating_add(PER_ARTICLE_OVERHEAD)
}

#[derive(Debug, Clone)]
pub struct Batch {
    /// 0-based position in the plan.
    pub index: usize,
    pub articles: Vec<Article>,
    pub estimated_tokens: u32,
}

/// Pack articles in order into batches whose estimate stays within `budget`.
/// An article that alone exceeds the budget gets its own batch with clipped content.
pub fn plan_batches(articles: Vec<Article>, budget: u32) -> Vec<Batch> {
    let budget = budget.max(PER_ARTICLE_OVERHEAD + 1);
    let mut out: Vec<Batch> = Vec::new();
    let mut cur: Vec<Article> = Vec::new();
    let mut cur_tokens = 0u32;

    for mut a in articles {
        let cost = estimate_tokens(&a);
        if cost > budget {
            flush(&mut cur, &mut cur_tokens, &mut out);
            clip_to_budget(&mut a, budget);
            let clipped = estimate_tokens(&a);
            cur.push(a);
            cur_tokens = clipped;
            flush(&mut cur, &mut cur_tokens, &mut out);
            continue;
        }
        if cur_tokens.saturating_add(cost) > budget {
            flush(&mut cur, &mut cur_tokens, &mut out);
        }
        cur_tokens += cost;
        cur.push(a);
    }
    flush(&mut cur, &mut cur_tokens, &mut out);
    out
}

fn flush(cur: &mut Vec<Article>, cur_tokens: &mut u32, out: &mut Vec<Batch>) {
    if cur.is_empty() {
        return;
    }
    let index = out.len();
    out.push(Batch {
        index,
        articles: std::mem::take(cur),
        estimated_tokens: *cur_tokens,
    });
    *cur_tokens = 0;
}

fn clip_to_budget(a: &mut Article, budget: u32) {
    let fixed = a.title.chars().count() + a.url.chars().count();
    let room_tokens = budget.saturating_sub(PER_ARTICLE_OVERHEAD) as usize;
    let room_chars = (room_tokens * 4).saturating_sub(fixed);
    if a.content.chars().count() > room_chars {
        a.content = a.content.chars().take(room_chars).collect();
    }
}

/// Cap text at `max_chars` characters; a cut ends with an ellipsis inside the cap.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::ArticleId;
    use chrono::Utc;

    fn article(i: usize, content_len: usize) -> Article {
        let url = format!("https://x.test/{i}");
        Article {
            id: ArticleId::derive("s", &url),
            source: "s".into(),
            title: format!("t{i}"),
            content: "x".repeat(content_len),
            url,
            published_at: Utc::now(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn batches_respect_budget_and_order() {
        let arts: Vec<_> = (0..10).map(|i| article(i, 200)).collect();
        let batches = plan_batches(arts, 200);
        assert!(batches.len() > 1);
        let mut seen = Vec::new();
        for (i, b) in batches.iter().enumerate() {
            assert_eq!(b.index, i);
            assert!(b.estimated_tokens <= 200);
            seen.extend(b.articles.iter().map(|a| a.title.clone()));
        }
        let expected: Vec<_> = (0..10).map(|i| format!("t{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn oversize_article_is_alone_and_clipped() {
        let arts = vec![article(0, 10), article(1, 10_000), article(2, 10)];
        let batches = plan_batches(arts, 300);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].articles.len(), 1);
        assert!(estimate_tokens(&batches[1].articles[0]) <= 300);
    }

    #[test]
    fn truncation_never_exceeds_cap() {
        let long = "word ".repeat(400);
        for cap in [0, 1, 2, 10, 499, 500] {
            assert!(truncate_summary(&long, cap).chars().count() <= cap);
        }
        assert_eq!(truncate_summary("short", 500), "short");
        assert_eq!(truncate_summary("héllo wörld", 6), "héllo…");
    }
}
