use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::BriefError;
use crate::metrics::Metrics;
use crate::notify::ChannelId;
use crate::orchestrator::{Phase, PipelineOrchestrator};
use crate::report::RunReport;

const DEFAULT_RUNS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Process shutdown token; manual runs stop with the process.
    pub shutdown: CancellationToken,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            shutdown,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(status))
        .route("/runs", get(runs))
        .route("/run", post(run_now))
        .with_state(state);
    let app = match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    };
    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

#[derive(Serialize)]
struct StatusOut {
    phase: Phase,
    running: bool,
    sources: Vec<String>,
    channels: Vec<ChannelId>,
    seen: usize,
    last_run: Option<u64>,
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    let o = &state.orchestrator;
    Json(StatusOut {
        phase: o.phase(),
        running: o.is_running(),
        sources: o.sources().map(|s| s.name.clone()).collect(),
        channels: o.channels(),
        seen: o.dedup().len().unwrap_or(0),
        last_run: o.history().last().map(|r| r.run_id),
    })
}

#[derive(Deserialize)]
struct RunsQuery {
    limit: Option<usize>,
}

async fn runs(State(state): State<AppState>, Query(q): Query<RunsQuery>) -> Json<Vec<RunReport>> {
    let n = q.limit.unwrap_or(DEFAULT_RUNS);
    Json(state.orchestrator.history().snapshot_last_n(n))
}

async fn run_now(State(state): State<AppState>) -> Result<Json<RunReport>, ApiError> {
    let report = state.orchestrator.run(&state.shutdown.child_token()).await?;
    Ok(Json(report))
}

struct ApiError(BriefError);

impl From<BriefError> for ApiError {
    fn from(e: BriefError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self.0 {
            BriefError::RunInProgress => StatusCode::CONFLICT,
            BriefError::Dedup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (code, Json(body)).into_response()
    }
}
