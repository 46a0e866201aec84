// src/summarize/llm.rs
//! LLM transport abstraction. The queue owns retry and timeout; clients do one call.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::anthropic::AnthropicClient;
use crate::config::AnthropicConfig;
use crate::retry::Transient;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Classified so the retry loop can tell a busy provider from a bad request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("llm call timed out")]
    Timeout,
    #[error("llm provider rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        !matches!(self, LlmError::Rejected { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

pub trait LlmClient: Send + Sync {
    fn complete<'a>(&'a self, req: &'a LlmRequest) -> LlmFuture<'a>;
    fn provider_name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Deterministic client for local runs and tests: returns the same text for every call.
#[derive(Debug)]
pub struct StaticLlm {
    text: String,
    calls: AtomicU32,
}

impl StaticLlm {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticLlm {
    fn default() -> Self {
        Self::new("News brief (mock): the latest items are listed below.")
    }
}

impl LlmClient for StaticLlm {
    fn complete<'a>(&'a self, _req: &'a LlmRequest) -> LlmFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = self.text.clone();
        Box::pin(async move { Ok(out) })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory:
/// * `AI_TEST_MODE=mock` gives a [`StaticLlm`].
/// * Otherwise an Anthropic client; an empty API key is a configuration error.
pub fn build_llm_client(cfg: &AnthropicConfig) -> anyhow::Result<DynLlm> {
    if std::env::var("AI_TEST_MODE").is_ok_and(|v| v == "mock") {
        tracing::info!(target: "summarize", "AI_TEST_MODE=mock, using static llm");
        return Ok(Arc::new(StaticLlm::default()));
    }
    if cfg.api_key.trim().is_empty() {
        anyhow::bail!("ai.anthropic.api_key is empty (set ANTHROPIC_API_KEY or AI_TEST_MODE=mock)");
    }
    Ok(Arc::new(AnthropicClient::new(cfg)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejections_are_fatal() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Transport("503".into()).is_transient());
        let rl = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(rl.is_transient());
        assert_eq!(rl.retry_after(), Some(Duration::from_secs(2)));
        assert!(!LlmError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
    }

    #[tokio::test]
    async fn static_llm_counts_calls() {
        let llm = StaticLlm::new("fixed");
        let req = LlmRequest {
            system: String::new(),
            prompt: "p".into(),
            max_tokens: 10,
            temperature: 0.0,
        };
        assert_eq!(llm.complete(&req).await.unwrap(), "fixed");
        assert_eq!(llm.calls(), 1);
    }
}
