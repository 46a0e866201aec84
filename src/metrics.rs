use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Later calls reuse the first handle.
    pub fn init(interval_secs: u64) -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe();
            Ok::<_, anyhow::Error>(handle)
        })?;
        gauge!("brief_interval_secs").set(interval_secs as f64);
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("brief_runs_total", "Pipeline runs by terminal status");
    describe_counter!("brief_fetch_attempts_total", "Source fetch attempts");
    describe_counter!("brief_fetch_rate_limited_total", "Fetches denied by the source quota");
    describe_counter!("brief_source_unavailable_total", "Fetches that exhausted their retries");
    describe_counter!("brief_raw_items_total", "Raw items decoded from sources");
    describe_counter!("brief_new_articles_total", "Articles admitted by dedup");
    describe_counter!("brief_dedup_dropped_total", "Articles dropped as already seen");
    describe_counter!("brief_llm_calls_total", "LLM completion calls");
    describe_counter!("brief_summary_failures_total", "Batches that could not be summarized");
    describe_counter!("brief_notify_delivered_total", "Digests delivered, per channel");
    describe_counter!("brief_notify_failed_total", "Digests that failed delivery, per channel");
    describe_histogram!("brief_llm_ms", Unit::Milliseconds, "LLM call latency incl. retries");
    describe_histogram!("brief_fetch_ms", Unit::Milliseconds, "Source fetch time incl. retries");
    describe_histogram!("brief_parse_ms", Unit::Milliseconds, "Feed decode time");
    describe_gauge!("brief_interval_secs", Unit::Seconds, "Configured scheduler interval");
    describe_gauge!("brief_last_run_ts", Unit::Seconds, "Unix time the last scheduled run finished");
}
