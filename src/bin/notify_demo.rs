//! Sends one sample digest through every enabled channel of the loaded config.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use news_brief_bot::article::ArticleId;
use news_brief_bot::config::load_config_default;
use news_brief_bot::init_tracing;
use news_brief_bot::notify::NotificationDispatcher;
use news_brief_bot::summarize::{DigestLink, SummaryResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()?;
    let dispatcher = NotificationDispatcher::from_config(&cfg.notifications, &cfg.ai.summary)?;
    if dispatcher.is_empty() {
        println!("notify-demo: no channel enabled");
        return Ok(());
    }

    let url = "https://example.com/news/demo";
    let digest = SummaryResult {
        batch: 0,
        article_ids: vec![ArticleId::derive("demo", url)],
        summary_text: "Demo digest: the pipeline can reach this channel.".into(),
        sentiment: None,
        language: cfg.ai.summary.language.clone(),
        generated_at: Utc::now(),
        links: vec![DigestLink {
            title: "Demo article".into(),
            url: url.into(),
        }],
    };

    for d in dispatcher.dispatch(&digest, &CancellationToken::new()).await {
        match &d.error {
            None => println!("{}: {:?} ({} part(s))", d.channel, d.status, d.parts),
            Some(e) => println!("{}: {:?} ({e})", d.channel, d.status),
        }
    }
    println!("notify-demo done");
    Ok(())
}
