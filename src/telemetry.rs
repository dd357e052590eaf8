use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Structured JSON logs, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Install the Prometheus recorder and describe the metrics both
/// processes emit.
pub fn install_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("tasks_submitted_total", "Crops accepted for dispatch");
    metrics::describe_counter!(
        "tasks_requeued_total",
        "Jobs returned to the submission queue after a failed dispatch"
    );
    metrics::describe_counter!("tasks_received_total", "Jobs received by the worker");
    metrics::describe_counter!("tasks_processed_total", "Jobs the detector completed");
    metrics::describe_counter!("tasks_failed_total", "Jobs the detector failed on");
    metrics::describe_counter!("results_received_total", "Results stored in the registry");
    metrics::describe_counter!(
        "results_discarded_total",
        "Results with no pending registry entry"
    );
    metrics::describe_counter!("delivery_sent_total", "Frames delivered to the peer");
    metrics::describe_counter!(
        "delivery_requeued_total",
        "Frames requeued after a failed send"
    );
    metrics::describe_histogram!("detection_seconds", "Time spent in the detector per job");
    metrics::describe_gauge!("submission_queue_depth", "Jobs waiting for dispatch");
    metrics::describe_gauge!("processing_queue_depth", "Jobs waiting for the processing slot");
    metrics::describe_gauge!("result_queue_depth", "Results waiting to be sent");

    Ok(handle)
}
