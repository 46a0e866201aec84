// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod article;
pub mod config;
pub mod dedup;
pub mod error;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod ratelimit;
pub mod report;
pub mod retry;
pub mod scheduler;

// Pipeline stages
pub mod ingest;
pub mod notify;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::article::{Article, ArticleId};
pub use crate::config::{load_config_default, load_config_from, AppConfig};
pub use crate::error::BriefError;
pub use crate::orchestrator::PipelineOrchestrator;
pub use crate::report::{RunReport, RunStatus};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,h2=warn,reqwest=warn,rustls=warn,lettre=warn";

/// Install the global subscriber. `RUST_LOG` overrides the filter; `LOG_FORMAT=json`
/// switches to one JSON object per line. Safe to call more than once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing already initialized");
    }
}
