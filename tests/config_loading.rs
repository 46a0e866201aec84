// tests/config_loading.rs
//
// Loader fallbacks, "ENV" secrets and per-kind defaults. Tests touching the
// process environment run serially.

use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;

use news_brief_bot::config::{
    load_config_default, load_config_from, QuotaUnit, SourceKind, ENV_CONFIG_PATH,
};

const SAMPLE: &str = include_str!("../config/brief.toml");

fn write_tmp(ext: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("brief.{ext}"));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn sample_config_loads_with_secrets_from_env() {
    std::env::set_var("NEWSAPI_API_KEY", "news-key");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
    std::env::remove_var("ANTHROPIC_API_KEY");

    let (_dir, path) = write_tmp("toml", SAMPLE);
    let cfg = load_config_from(&path).expect("sample config");

    let names: Vec<_> = cfg.enabled_sources().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["hackernews", "newsapi", "rust_reddit"]);

    let newsapi = &cfg.sources["newsapi"];
    match &newsapi.kind {
        SourceKind::NewsApi { api_key, .. } => assert_eq!(api_key, "news-key"),
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(newsapi.quota_unit(), QuotaUnit::PerDay);
    assert_eq!(cfg.sources["rust_reddit"].quota_unit(), QuotaUnit::PerMinute);

    let tg = cfg.notifications.telegram.as_ref().unwrap();
    assert_eq!(tg.bot_token, "123:abc");
    assert_eq!(cfg.notifications.enabled_count(), 1);
    assert!(cfg.ai.anthropic.api_key.is_empty(), "optional secret left empty");

    std::env::remove_var("NEWSAPI_API_KEY");
    std::env::remove_var("TELEGRAM_BOT_TOKEN");
}

#[test]
#[serial]
fn missing_secret_for_enabled_channel_is_an_error() {
    std::env::remove_var("TELEGRAM_BOT_TOKEN");
    let (_dir, path) = write_tmp(
        "toml",
        r#"
[notifications.telegram]
enabled = true
bot_token = "ENV"
chat_id = "1"
"#,
    );
    let err = load_config_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("TELEGRAM_BOT_TOKEN"), "{err:#}");
}

#[test]
#[serial]
fn json_config_and_env_path_override() {
    let (_dir, path) = write_tmp(
        "json",
        r#"{
  "pipeline": { "interval_secs": 900 },
  "sources": {
    "feeds": { "kind": "rss", "feeds": ["https://example.test/rss.xml"], "rate_limit": 30 }
  }
}"#,
    );
    std::env::set_var(ENV_CONFIG_PATH, &path);
    let cfg = load_config_default().expect("config via env path");
    std::env::remove_var(ENV_CONFIG_PATH);

    assert_eq!(cfg.pipeline.interval_secs, 900);
    assert!(cfg.pipeline.requeue_failed);
    assert_eq!(cfg.dedup.retention_days, 14);
    let feeds = &cfg.sources["feeds"];
    assert_eq!(feeds.rate_limit, Some(30));
    assert_eq!(feeds.retry_count, 3);
    assert_eq!(feeds.quota_unit(), QuotaUnit::PerMinute);
}

#[test]
#[serial]
fn env_path_to_missing_file_is_an_error() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/brief.toml");
    let err = load_config_default().unwrap_err();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(err.to_string().contains(ENV_CONFIG_PATH));
}
