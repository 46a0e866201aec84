// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_retry_count() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_concurrency() -> usize {
    1
}
fn default_max_length() -> usize {
    500
}
fn default_language() -> String {
    "en".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from ANTHROPIC_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds per call.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// In-flight summarization calls allowed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Estimated input tokens per batch; defaults to 4 × max_tokens.
    #[serde(default)]
    pub batch_token_budget: Option<u32>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry_count: default_retry_count(),
            timeout: default_timeout_secs(),
            concurrency: default_concurrency(),
            batch_token_budget: None,
        }
    }
}

impl AnthropicConfig {
    pub fn batch_budget(&self) -> u32 {
        self.batch_token_budget
            .unwrap_or_else(|| self.max_tokens.saturating_mul(4))
            .max(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    /// Clamp values the API would reject.
    pub fn sanitize(&mut self) {
        if !(0.0..=1.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        self.concurrency = self.concurrency.max(1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Hard cap on digest text length, in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_true")]
    pub include_links: bool,
    #[serde(default)]
    pub include_sentiment: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            include_links: true,
            include_sentiment: false,
            language: default_language(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_defaults_to_four_times_max_tokens() {
        let cfg = AnthropicConfig::default();
        assert_eq!(cfg.batch_budget(), 4096);

        let pinned = AnthropicConfig {
            batch_token_budget: Some(300),
            ..AnthropicConfig::default()
        };
        assert_eq!(pinned.batch_budget(), 300);
    }

    #[test]
    fn sanitize_restores_out_of_range_values() {
        let mut cfg = AnthropicConfig {
            temperature: 3.5,
            max_tokens: 0,
            concurrency: 0,
            ..AnthropicConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.temperature, 0.3);
        assert_eq!(cfg.max_tokens, 1024);
        assert_eq!(cfg.concurrency, 1);
    }
}
