// tests/e2e_http.rs
//
// End-to-end over real HTTP on loopback: the configured RSS feed and the
// Telegram Bot API are served by a local axum app. Config comes from a TOML
// file, the LLM is the deterministic StaticLlm.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use news_brief_bot::config::load_config_from;
use news_brief_bot::notify::{ChannelId, JobStatus};
use news_brief_bot::summarize::StaticLlm;
use news_brief_bot::{PipelineOrchestrator, RunStatus};

const RSS: &str = include_str!("fixtures/rss.xml");
const BOT_TOKEN: &str = "test-token";

type Inbox = Arc<Mutex<Vec<Value>>>;

async fn send_message(State(inbox): State<Inbox>, Json(body): Json<Value>) -> Json<Value> {
    inbox.lock().push(body);
    Json(json!({ "ok": true, "result": { "message_id": 1 } }))
}

async fn spawn_upstream() -> (SocketAddr, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = Router::new()
        .route(
            "/feed.xml",
            get(|| async { ([("content-type", "application/rss+xml")], RSS) }),
        )
        .route(&format!("/bot{BOT_TOKEN}/sendMessage"), post(send_message))
        .with_state(inbox.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, inbox)
}

fn write_config(dir: &std::path::Path, addr: SocketAddr) -> std::path::PathBuf {
    let toml = format!(
        r#"
[pipeline]
interval_secs = 600
state_dir = "{state}"

[sources.wire]
kind = "rss"
feeds = ["http://{addr}/feed.xml"]
timeout = 5
retry_count = 1

[ai.anthropic]
api_key = "unused"

[ai.summary]
max_length = 500
include_links = true

[notifications.telegram]
enabled = true
bot_token = "{BOT_TOKEN}"
chat_id = "-100123"
api_base = "http://{addr}"
retry_count = 0

[notifications.email]
enabled = false
smtp_host = "smtp.example.com"
smtp_user = "ENV"
smtp_pass = "ENV"
from = "bot@example.com"
to = ["me@example.com"]
"#,
        state = dir.display(),
    );
    let path = dir.join("brief.toml");
    std::fs::write(&path, toml).unwrap();
    path
}

#[tokio::test]
async fn rss_to_telegram_end_to_end() {
    let (addr, inbox) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&write_config(dir.path(), addr)).unwrap();

    let long_reply = "Chipmakers posted record quarterly sales. ".repeat(30);
    let orch = PipelineOrchestrator::from_config(&cfg, Arc::new(StaticLlm::new(long_reply))).unwrap();
    assert_eq!(orch.channels(), vec![ChannelId::Telegram]);

    let cancel = CancellationToken::new();
    let report = orch.run(&cancel).await.unwrap();
    assert_eq!(report.status, RunStatus::Succeeded, "{report}");
    assert_eq!(report.new_articles, 3);
    assert_eq!(report.batches_summarized, 1);
    assert_eq!(report.deliveries.len(), 1, "email is disabled");
    assert_eq!(report.deliveries[0].channel, ChannelId::Telegram);
    assert_eq!(report.deliveries[0].status, JobStatus::Delivered);

    {
        let sent = inbox.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], "-100123");
        let text = sent[0]["text"].as_str().unwrap();
        assert!(text.contains("News brief (3 articles)"), "{text}");
        assert!(text.contains("https://news.example.com/2025/09/chips-record"));
        let summary = text.split("\n\n").nth(1).unwrap();
        assert!(summary.starts_with("Chipmakers posted"), "{summary}");
        assert!(summary.chars().count() <= 500, "{} chars", summary.chars().count());
        assert!(summary.ends_with('…'));
    }

    let again = orch.run(&cancel).await.unwrap();
    assert_eq!(again.new_articles, 0);
    assert_eq!(again.status, RunStatus::NoNews);
    assert_eq!(inbox.lock().len(), 1);

    assert!(dir.path().join("seen.json").exists());
    assert!(dir.path().join("ratelimits.json").exists());
}

#[tokio::test]
async fn restart_restores_seen_articles_from_state_dir() {
    let (addr, inbox) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&write_config(dir.path(), addr)).unwrap();
    let cancel = CancellationToken::new();

    let first = PipelineOrchestrator::from_config(&cfg, Arc::new(StaticLlm::default())).unwrap();
    assert_eq!(first.run(&cancel).await.unwrap().new_articles, 3);
    drop(first);

    let restarted =
        PipelineOrchestrator::from_config(&cfg, Arc::new(StaticLlm::default())).unwrap();
    assert_eq!(restarted.dedup().len().unwrap(), 3);
    let report = restarted.run(&cancel).await.unwrap();
    assert_eq!(report.new_articles, 0);
    assert_eq!(inbox.lock().len(), 1);
}

#[tokio::test]
async fn unreachable_feed_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // Bind then drop to get a port with nothing listening.
    let dead = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let cfg = load_config_from(&write_config(dir.path(), dead)).unwrap();
    let orch = PipelineOrchestrator::from_config(&cfg, Arc::new(StaticLlm::default()))
        .unwrap()
        .with_state_dir(None);

    let report = orch.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.status, RunStatus::Degraded);
    assert_eq!(report.sources[0].attempts, 2);
    assert_eq!(report.failed_sources(), 1);
}
