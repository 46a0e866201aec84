//! News brief bot: binary entrypoint.
//! Loads configuration, wires the pipeline, then either runs one pass (`--once`)
//! or starts the scheduler next to the status HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use news_brief_bot::api::{self, AppState};
use news_brief_bot::config::{load_config_default, load_config_from};
use news_brief_bot::metrics::Metrics;
use news_brief_bot::scheduler::{spawn_scheduler, SchedulerCfg};
use news_brief_bot::summarize::build_llm_client;
use news_brief_bot::{init_tracing, PipelineOrchestrator, RunStatus};

const ENV_HTTP_ADDR: &str = "BRIEF_HTTP_ADDR";
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

struct Args {
    once: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        once: false,
        config: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--once" => args.once = true,
            "--config" => {
                let p = it.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(p));
            }
            other => anyhow::bail!("unknown argument `{other}` (expected --once, --config <path>)"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; missing file is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = parse_args()?;
    let cfg = match &args.config {
        Some(p) => load_config_from(p)?,
        None => load_config_default()?,
    };
    let llm = build_llm_client(&cfg.ai.anthropic)?;
    let orchestrator = Arc::new(PipelineOrchestrator::from_config(&cfg, llm)?);
    tracing::info!(
        sources = orchestrator.sources().count(),
        channels = ?orchestrator.channels(),
        "pipeline ready"
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, shutting down");
            }
            shutdown.cancel();
        });
    }

    if args.once {
        let report = orchestrator.run(&shutdown).await?;
        println!("{report}");
        if report.status == RunStatus::Degraded {
            std::process::exit(2);
        }
        return Ok(());
    }

    let metrics = Metrics::init(cfg.pipeline.interval_secs)?;
    let scheduler = spawn_scheduler(
        SchedulerCfg {
            interval_secs: cfg.pipeline.interval_secs,
            run_on_start: true,
        },
        orchestrator.clone(),
        shutdown.clone(),
    );

    let addr: SocketAddr = std::env::var(ENV_HTTP_ADDR)
        .unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string())
        .parse()
        .with_context(|| format!("invalid {ENV_HTTP_ADDR}"))?;
    let app = api::router(AppState::new(orchestrator, shutdown.clone()).with_metrics(metrics));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "status api listening");

    let until = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { until.cancelled().await })
        .await?;

    scheduler.await.ok();
    Ok(())
}
