// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::BriefError;
use crate::orchestrator::PipelineOrchestrator;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
    /// Run once immediately instead of waiting a full interval.
    pub run_on_start: bool,
}

/// Spawn the periodic run loop. Ticks that land while a run is active are skipped.
pub fn spawn_scheduler(
    cfg: SchedulerCfg,
    orchestrator: Arc<PipelineOrchestrator>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.interval_secs.max(1));
        let start = if cfg.run_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + period
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match orchestrator.run(&shutdown).await {
                Ok(report) => {
                    gauge!("brief_last_run_ts").set(report.finished_at.timestamp() as f64);
                }
                Err(BriefError::RunInProgress) => {
                    tracing::debug!(target: "scheduler", "tick skipped, run in progress");
                }
                Err(e) => {
                    tracing::error!(target: "scheduler", error = %e, "scheduled run failed");
                }
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    })
}
