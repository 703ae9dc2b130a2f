use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

/// Register descriptions for every pipeline metric.
pub fn describe_metrics() {
    metrics::describe_counter!("pipeline_jobs_total", "Image jobs accepted by intake");
    metrics::describe_counter!("pipeline_jobs_completed", "Image jobs that reached done");
    metrics::describe_counter!("pipeline_jobs_failed", "Image jobs that reached error");
    metrics::describe_counter!(
        "pipeline_steps_degraded_total",
        "Pipeline steps that recorded a warning or error"
    );
    metrics::describe_histogram!(
        "pipeline_processing_seconds",
        "Time from claiming a job to its terminal state"
    );
    metrics::describe_gauge!("pipeline_jobs_in_flight", "Jobs currently being processed");
}

/// Router serving the Prometheus scrape endpoint at `/metrics`.
pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// Metrics in Prometheus text exposition format.
async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
