// src/ingest/mod.rs
pub mod client;
pub mod fetcher;
pub mod normalize;
pub mod providers;
pub mod types;

pub use client::HttpSourceProvider;
pub use fetcher::{FetchOutcome, FetchStatus, SourceFetcher};
pub use normalize::{Normalized, Normalizer};
pub use types::{RawItem, SourceProvider};

/// Hard cap for article bodies kept after cleaning.
pub const MAX_CONTENT_CHARS: usize = 4000;
pub const MAX_TITLE_CHARS: usize = 300;

/// Clean text: decode entities, strip tags, ASCII quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    out
}

/// Case-insensitive "does any keyword occur in the text".
pub fn mentions_any<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let hay = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .any(|k| hay.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b>!</p>  \n ";
        assert_eq!(normalize_text(s, 100), "Hello, world !");
    }

    #[test]
    fn normalize_text_caps_length() {
        let s = "abcdef ghij";
        assert_eq!(normalize_text(s, 7), "abcdef");
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        assert!(mentions_any("Tokio 2.0 released", &["tokio"]));
        assert!(!mentions_any("Tokio 2.0 released", &["  ", "async-std"]));
    }
}
