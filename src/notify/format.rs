// src/notify/format.rs
//! One renderer for every channel. Channel differences are data in [`ChannelFormat`].

use crate::config::{ChannelCommon, SummaryConfig};
use crate::summarize::SummaryResult;

/// Telegram rejects messages above 4096 characters; keep headroom for entities.
pub const TELEGRAM_MAX_CHARS: usize = 4000;
/// Discord embed description limit.
pub const DISCORD_MAX_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Plain,
    /// Telegram legacy Markdown.
    Markdown,
    MarkdownV2,
    Html,
    /// Slack `mrkdwn`.
    Slack,
}

impl Markup {
    /// Telegram-style `parse_mode` value; unknown or absent means plain text.
    pub fn from_parse_mode(mode: Option<&str>) -> Self {
        match mode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            Some("markdown") => Markup::Markdown,
            Some("markdownv2") => Markup::MarkdownV2,
            Some("html") => Markup::Html,
            _ => Markup::Plain,
        }
    }

    pub fn telegram_parse_mode(self) -> Option<&'static str> {
        match self {
            Markup::Markdown => Some("Markdown"),
            Markup::MarkdownV2 => Some("MarkdownV2"),
            Markup::Html => Some("HTML"),
            Markup::Plain | Markup::Slack => None,
        }
    }

    pub fn escape(self, s: &str) -> String {
        match self {
            Markup::Plain => s.to_string(),
            Markup::Markdown => escape_with(s, &['_', '*', '`', '[']),
            Markup::MarkdownV2 => escape_with(
                s,
                &[
                    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{',
                    '}', '.', '!', '\\',
                ],
            ),
            Markup::Html => html_escape::encode_text(s).to_string(),
            Markup::Slack => s
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;"),
        }
    }

    fn bold(self, s: &str) -> String {
        let e = self.escape(s);
        match self {
            Markup::Plain => e,
            Markup::Markdown | Markup::MarkdownV2 | Markup::Slack => format!("*{e}*"),
            Markup::Html => format!("<b>{e}</b>"),
        }
    }

    fn link(self, title: &str, url: &str) -> String {
        match self {
            Markup::Plain => format!("{title} - {url}"),
            Markup::Markdown => format!("[{}]({url})", escape_with(title, &['[', ']'])),
            Markup::MarkdownV2 => format!(
                "[{}]({})",
                self.escape(title),
                escape_with(url, &[')', '\\'])
            ),
            Markup::Html => format!(
                "<a href=\"{}\">{}</a>",
                html_escape::encode_double_quoted_attribute(url),
                html_escape::encode_text(title)
            ),
            Markup::Slack => format!("<{url}|{}>", self.escape(title).replace('|', "/")),
        }
    }
}

fn escape_with(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFormat {
    pub markup: Markup,
    pub link_previews: bool,
    /// `None` sends the digest as one message.
    pub max_message_chars: Option<usize>,
    pub include_links: bool,
}

impl ChannelFormat {
    fn from_common(
        common: &ChannelCommon,
        summary: &SummaryConfig,
        markup: Markup,
        default_max: Option<usize>,
    ) -> Self {
        Self {
            markup,
            link_previews: !common.disable_web_page_preview,
            max_message_chars: common.max_message_chars.or(default_max),
            include_links: common.include_links.unwrap_or(summary.include_links),
        }
    }

    pub fn telegram(common: &ChannelCommon, summary: &SummaryConfig) -> Self {
        let markup = Markup::from_parse_mode(common.parse_mode.as_deref());
        let mut f = Self::from_common(common, summary, markup, Some(TELEGRAM_MAX_CHARS));
        f.max_message_chars = f.max_message_chars.map(|m| m.min(TELEGRAM_MAX_CHARS));
        f
    }

    pub fn email(common: &ChannelCommon, summary: &SummaryConfig) -> Self {
        let markup = match Markup::from_parse_mode(common.parse_mode.as_deref()) {
            Markup::Html => Markup::Html,
            _ => Markup::Plain,
        };
        Self::from_common(common, summary, markup, None)
    }

    pub fn slack(common: &ChannelCommon, summary: &SummaryConfig) -> Self {
        Self::from_common(common, summary, Markup::Slack, None)
    }

    pub fn discord(common: &ChannelCommon, summary: &SummaryConfig) -> Self {
        // Discord renders a Markdown dialect close to Telegram's legacy one.
        let mut f = Self::from_common(common, summary, Markup::Markdown, Some(DISCORD_MAX_CHARS));
        f.max_message_chars = f.max_message_chars.map(|m| m.min(DISCORD_MAX_CHARS));
        f
    }

    pub fn plain() -> Self {
        Self {
            markup: Markup::Plain,
            link_previews: true,
            max_message_chars: None,
            include_links: true,
        }
    }
}

/// Render a digest into one or more message parts.
pub fn render(digest: &SummaryResult, fmt: &ChannelFormat) -> Vec<String> {
    let m = fmt.markup;
    let mut lines: Vec<String> = Vec::new();

    let n = digest.article_ids.len();
    let header = format!(
        "News brief ({n} article{})",
        if n == 1 { "" } else { "s" }
    );
    lines.push(m.bold(&header));
    lines.push(String::new());
    lines.extend(digest.summary_text.lines().map(|l| m.escape(l)));

    if let Some(s) = digest.sentiment {
        lines.push(String::new());
        lines.push(m.escape(&format!("Sentiment: {s}")));
    }

    if fmt.include_links && !digest.links.is_empty() {
        lines.push(String::new());
        for l in &digest.links {
            lines.push(format!("{} {}", m.escape("-"), m.link(&l.title, &l.url)));
        }
    }

    let text = lines.join("\n");
    match fmt.max_message_chars {
        Some(max) => split_message(&text, max, m),
        None => vec![text],
    }
}

/// Split on line boundaries so every part has at most `max_chars` characters.
/// A single line longer than the limit is cut by characters, never inside an escape
/// sequence or a `markup` entity unless the entity alone exceeds the limit.
pub fn split_message(text: &str, max_chars: usize, markup: Markup) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for line in text.split('\n') {
        let len = line.chars().count();
        let needed = if cur.is_empty() { len } else { cur_len + 1 + len };
        if needed <= max_chars {
            if !cur.is_empty() {
                cur.push('\n');
            }
            cur.push_str(line);
            cur_len = needed;
            continue;
        }
        if !cur.is_empty() {
            parts.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        if len <= max_chars {
            cur.push_str(line);
            cur_len = len;
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut rest = &chars[..];
        while !rest.is_empty() {
            let cut = safe_cut(rest, max_chars, markup);
            parts.push(rest[..cut].iter().collect());
            rest = &rest[cut..];
        }
    }
    if !cur.trim().is_empty() {
        parts.push(cur);
    }
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Largest cut point `<= max` that leaves escapes and entities whole.
fn safe_cut(chars: &[char], max: usize, markup: Markup) -> usize {
    if chars.len() <= max || markup == Markup::Plain {
        return max.min(chars.len());
    }
    let mut scan = EntityScan::default();
    let mut best = 0;
    for (i, &c) in chars.iter().take(max).enumerate() {
        scan.feed(c, markup);
        if scan.at_boundary() {
            best = i + 1;
        }
    }
    if best == 0 {
        max
    } else {
        best
    }
}

#[derive(Default)]
struct EntityScan {
    /// Previous char was an unescaped backslash.
    escaped: bool,
    bold: bool,
    /// 0 outside, 1 link text, 2 after `]`, 3 link target.
    link: u8,
    tag: bool,
    tag_start: bool,
    closing: bool,
    open_elements: usize,
    entity: bool,
}

impl EntityScan {
    fn feed(&mut self, c: char, markup: Markup) {
        match markup {
            Markup::Plain => {}
            Markup::Markdown | Markup::MarkdownV2 => self.feed_markdown(c),
            Markup::Html | Markup::Slack => self.feed_angle(c, markup),
        }
    }

    fn feed_markdown(&mut self, c: char) {
        if self.escaped {
            self.escaped = false;
            return;
        }
        match (c, self.link) {
            ('\\', _) => self.escaped = true,
            ('[', 0) => self.link = 1,
            (']', 1) => self.link = 2,
            ('(', 2) => self.link = 3,
            (_, 2) => self.link = 0,
            (')', 3) => self.link = 0,
            ('*', 0) => self.bold = !self.bold,
            _ => {}
        }
    }

    fn feed_angle(&mut self, c: char, markup: Markup) {
        if self.tag {
            if self.tag_start {
                self.closing = c == '/';
                self.tag_start = false;
            }
            if c == '>' {
                self.tag = false;
                if markup == Markup::Html {
                    if self.closing {
                        self.open_elements = self.open_elements.saturating_sub(1);
                    } else {
                        self.open_elements += 1;
                    }
                }
            }
            return;
        }
        if self.entity {
            if c == ';' || c.is_whitespace() {
                self.entity = false;
            }
            return;
        }
        match c {
            '<' => {
                self.tag = true;
                self.tag_start = true;
            }
            '&' => self.entity = true,
            '*' if markup == Markup::Slack => self.bold = !self.bold,
            _ => {}
        }
    }

    fn at_boundary(&self) -> bool {
        !self.escaped
            && !self.bold
            && self.link == 0
            && !self.tag
            && !self.entity
            && self.open_elements == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::ArticleId;
    use crate::summarize::{DigestLink, Sentiment};
    use chrono::Utc;

    fn digest() -> SummaryResult {
        SummaryResult {
            batch: 0,
            article_ids: vec![ArticleId::derive("s", "https://x.test/a")],
            summary_text: "Rust 1.90 ships. Cargo gets faster!".into(),
            sentiment: Some(Sentiment::Positive),
            language: "en".into(),
            generated_at: Utc::now(),
            links: vec![DigestLink {
                title: "Rust 1.90 [release]".into(),
                url: "https://blog.test/rust_1.90".into(),
            }],
        }
    }

    fn fmt(markup: Markup) -> ChannelFormat {
        ChannelFormat {
            markup,
            link_previews: false,
            max_message_chars: None,
            include_links: true,
        }
    }

    #[test]
    fn markdown_v2_escapes_reserved_chars() {
        let out = render(&digest(), &fmt(Markup::MarkdownV2));
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("*News brief \\(1 article\\)*"));
        assert!(out[0].contains("Rust 1\\.90 ships\\. Cargo gets faster\\!"));
        assert!(out[0].contains("[Rust 1\\.90 \\[release\\]](https://blog.test/rust_1.90)"));
    }

    #[test]
    fn html_and_slack_links() {
        let html = render(&digest(), &fmt(Markup::Html)).remove(0);
        assert!(html.contains("<a href=\"https://blog.test/rust_1.90\">Rust 1.90 [release]</a>"));
        let slack = render(&digest(), &fmt(Markup::Slack)).remove(0);
        assert!(slack.contains("<https://blog.test/rust_1.90|Rust 1.90 [release]>"));
    }

    #[test]
    fn links_can_be_dropped_per_channel() {
        let mut f = fmt(Markup::Plain);
        f.include_links = false;
        let out = render(&digest(), &f).remove(0);
        assert!(!out.contains("https://"));
        assert!(out.contains("Sentiment: positive"));
    }

    #[test]
    fn split_respects_limit_and_line_boundaries() {
        let text = (0..50)
            .map(|i| format!("line number {i:02}"))
            .collect::<Vec<_>>()
            .join("\n");
        let parts = split_message(&text, 100, Markup::Plain);
        assert!(parts.len() > 1);
        for p in &parts {
            assert!(p.chars().count() <= 100);
            assert!(p.starts_with("line number"));
        }
        assert_eq!(parts.join("\n"), text);
    }

    #[test]
    fn overlong_line_is_hard_cut() {
        let parts = split_message(&"x".repeat(250), 100, Markup::Plain);
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
    }

    #[test]
    fn hard_cut_keeps_markdown_escapes_whole() {
        let line = "\\.".repeat(150);
        let parts = split_message(&line, 101, Markup::MarkdownV2);
        assert_eq!(parts.concat(), line);
        for p in &parts {
            let n = p.chars().count();
            assert!(n <= 101);
            assert_eq!(n % 2, 0, "escape split in {p:?}");
            assert!(p.starts_with('\\'));
        }
    }

    #[test]
    fn hard_cut_does_not_split_html_links_or_markdown_entities() {
        let link = format!("<a href=\"https://x.test/{}\">Story</a>", "p".repeat(20));
        let line = format!("{}{link}", "w".repeat(90));
        let parts = split_message(&line, 100, Markup::Html);
        assert_eq!(parts, vec!["w".repeat(90), link]);

        let md = format!("{}[Story](https://x.test/{})", "w".repeat(90), "p".repeat(20));
        let parts = split_message(&md, 100, Markup::Markdown);
        assert_eq!(parts[0], "w".repeat(90));
        assert!(parts[1].starts_with("[Story]("));

        let bold = format!("{}*headline*", "w".repeat(95));
        let parts = split_message(&bold, 100, Markup::MarkdownV2);
        assert_eq!(parts, vec!["w".repeat(95), "*headline*".to_string()]);
    }

    #[test]
    fn telegram_format_caps_at_4000() {
        let common = ChannelCommon {
            max_message_chars: Some(10_000),
            parse_mode: Some("HTML".into()),
            ..ChannelCommon::default()
        };
        let f = ChannelFormat::telegram(&common, &SummaryConfig::default());
        assert_eq!(f.max_message_chars, Some(TELEGRAM_MAX_CHARS));
        assert_eq!(f.markup, Markup::Html);
        assert_eq!(f.markup.telegram_parse_mode(), Some("HTML"));
    }
}
