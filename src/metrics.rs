// src/metrics.rs
use std::net::SocketAddr;

use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition before first use).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_ticks_total", "Scheduler ticks executed.");
        describe_counter!(
            "poll_handle_outcomes_total",
            "Per-handle outcomes, labelled poll/empty/failed."
        );
        describe_counter!("search_posts_total", "Posts kept after normalization.");
        describe_counter!("search_retries_total", "Search calls retried after a transient failure.");
        describe_counter!("search_errors_total", "Search calls that failed for good.");
        describe_counter!("generation_errors_total", "Summarization failures.");
        describe_histogram!("search_duration_ms", "Search time per handle in milliseconds.");
        describe_histogram!("poll_tick_duration_ms", "Tick wall time in milliseconds.");
        describe_gauge!("poll_last_tick_ts", "Unix ts when the last tick finished.");
    });
}

/// Serve `/metrics` on `addr` (Prometheus text format). Needs a running tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: install exporter on {addr}"))?;
    ensure_metrics_described();
    Ok(())
}

/// Install a recorder without a listener and return the render handle (tests, probes).
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}
