// src/summarize/anthropic.rs
//! Anthropic Messages API client.

use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::llm::{LlmClient, LlmError, LlmFuture, LlmRequest};
use crate::config::AnthropicConfig;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(cfg: &AnthropicConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::client::USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(cfg.timeout())
            .build()
            .context("building anthropic http client")?;
        Ok(Self {
            http,
            url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 429 → rate limited; 408 and 5xx (529 = overloaded) → transport; other 4xx → rejected.
fn classify(status: StatusCode, headers: &reqwest::header::HeaderMap, body: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            retry_after: retry_after(headers),
        };
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return LlmError::Transport(format!("http {status}"));
    }
    LlmError::Rejected {
        status: status.as_u16(),
        message: body.chars().take(300).collect(),
    }
}

impl LlmClient for AnthropicClient {
    fn complete<'a>(&'a self, req: &'a LlmRequest) -> LlmFuture<'a> {
        Box::pin(async move {
            let body = Req {
                model: &self.model,
                max_tokens: req.max_tokens,
                temperature: req.temperature,
                system: &req.system,
                messages: vec![Msg {
                    role: "user",
                    content: &req.prompt,
                }],
            };

            let resp = self
                .http
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout
                    } else {
                        LlmError::Transport(e.to_string())
                    }
                })?;

            let status = resp.status();
            if !status.is_success() {
                let headers = resp.headers().clone();
                let text = resp.text().await.unwrap_or_default();
                return Err(classify(status, &headers, text));
            }

            let parsed: Resp = resp
                .json()
                .await
                .map_err(|e| LlmError::Transport(format!("decoding response: {e}")))?;
            let text = parsed
                .content
                .into_iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text)
                .collect::<Vec<_>>()
                .join("\n");
            if text.trim().is_empty() {
                return Err(LlmError::Transport("empty completion".into()));
            }
            Ok(text)
        })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn status_classification() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, &h, String::new()),
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        let empty = HeaderMap::new();
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, &empty, String::new()),
            LlmError::Transport(_)
        ));
        assert!(matches!(
            classify(StatusCode::from_u16(529).unwrap(), &empty, String::new()),
            LlmError::Transport(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &empty, "bad model".into()),
            LlmError::Rejected { status: 400, .. }
        ));
    }
}
