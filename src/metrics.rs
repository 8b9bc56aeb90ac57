use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder (first call only) and describe every series,
/// so they show up on `/metrics` before the first increment.
pub fn install() -> Result<PrometheusHandle> {
    HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow!("prometheus: install recorder: {e}"))?;
            describe_all();
            Ok(handle)
        })
        .cloned()
}

/// Router exposing `/metrics` in the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}

fn describe_all() {
    describe_counter!("extract_cache_hits_total", "Extractions served from cache.");
    describe_counter!("extract_cache_misses_total", "Extractions that ran the cascade.");
    describe_counter!(
        "extract_strategy_failures_total",
        "Strategy attempts that failed or came up short."
    );
    describe_counter!("collector_items_total", "Candidates written to batch artifacts.");
    describe_counter!("collector_errors_total", "Feed and enrichment failures.");
    describe_gauge!("collector_last_run_ts", "Unix time of the last batch written.");
    describe_counter!("producer_published_total", "Entries appended to the stream.");
    describe_counter!("producer_errors_total", "Per-item append failures.");
    describe_counter!("worker_processed_total", "Messages delivered to a worker.");
    describe_counter!("worker_acked_total", "Messages acknowledged.");
    describe_counter!(
        "worker_oracle_failures_total",
        "Oracle failures left pending for redelivery."
    );
    describe_counter!("worker_no_content_total", "Messages acked without content.");
    describe_counter!("worker_claimed_total", "Stale pending entries claimed from other consumers.");
    describe_counter!("dashboard_articles_total", "Articles folded into dashboard state.");
    describe_gauge!("dashboard_clients", "Connected dashboard observers.");
    describe_counter!("scheduler_runs_total", "Scheduled job invocations.");
    describe_counter!("scheduler_failures_total", "Scheduled job invocations that failed.");
    describe_gauge!(
        "scheduler_last_success_ts",
        "Unix time of the last successful run, per job."
    );
}
