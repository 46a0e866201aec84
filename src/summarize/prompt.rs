// src/summarize/prompt.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::article::Article;
use crate::config::SummaryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl Sentiment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_end_matches('.').to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            "mixed" => Some(Sentiment::Mixed),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

const SENTIMENT_PREFIX: &str = "SENTIMENT:";

pub fn system_prompt(cfg: &SummaryConfig) -> String {
    let mut s = format!(
        "You write short news briefs. Answer in language `{}`. \
         Write two short paragraphs: first the key facts across the articles, \
         then a one or two sentence conclusion. Plain text, no headings, no links. \
         Stay under {} characters.",
        cfg.language, cfg.max_length
    );
    if cfg.include_sentiment {
        s.push_str(&format!(
            " End with a final line `{SENTIMENT_PREFIX} <positive|neutral|negative|mixed>`."
        ));
    }
    s
}

/// Numbered article list, in batch order.
pub fn user_prompt(articles: &[Article]) -> String {
    let mut out = String::new();
    for (i, a) in articles.iter().enumerate() {
        out.push_str(&format!("[{}] {} ({})\n", i + 1, a.title, a.source));
        if !a.content.is_empty() {
            out.push_str(&a.content);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Split a trailing `SENTIMENT:` line off the model output.
pub fn split_sentiment(text: &str) -> (String, Option<Sentiment>) {
    let trimmed = text.trim_end();
    let (head, last) = match trimmed.rfind('\n') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    let last = last.trim();
    let is_tag = last
        .get(..SENTIMENT_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(SENTIMENT_PREFIX));
    if !is_tag {
        return (trimmed.to_string(), None);
    }
    let sentiment = Sentiment::parse(&last[SENTIMENT_PREFIX.len()..]);
    (head.trim_end().to_string(), sentiment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_sentiment_line_is_parsed_and_removed() {
        let (body, s) = split_sentiment("Markets rallied.\nInvestors cheered.\nsentiment: Positive\n");
        assert_eq!(body, "Markets rallied.\nInvestors cheered.");
        assert_eq!(s, Some(Sentiment::Positive));
    }

    #[test]
    fn unknown_or_missing_sentiment() {
        let (body, s) = split_sentiment("Body\nSENTIMENT: bullish");
        assert_eq!(body, "Body");
        assert_eq!(s, None);

        let (body, s) = split_sentiment("Just text");
        assert_eq!(body, "Just text");
        assert_eq!(s, None);
    }

    #[test]
    fn sentiment_instruction_only_when_enabled() {
        let mut cfg = SummaryConfig::default();
        assert!(!system_prompt(&cfg).contains(SENTIMENT_PREFIX));
        cfg.include_sentiment = true;
        assert!(system_prompt(&cfg).contains(SENTIMENT_PREFIX));
    }
}
