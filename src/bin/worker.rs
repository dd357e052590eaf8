use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use layout_dispatch::{
    app_state::WorkerState,
    config::WorkerConfig,
    routes,
    services::{
        detection::RasterSummaryDetector, layouts::LayoutCatalog, link::WsLink,
        processing::ProcessingLoop, queue::WorkQueue, result_sender,
    },
    shutdown, telemetry,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing();

    tracing::info!("Starting layout registration worker");

    // Load configuration
    let config = WorkerConfig::from_env().expect("Failed to load configuration");

    // Initialize Prometheus metrics recorder
    let prometheus_handle =
        Arc::new(telemetry::install_metrics().expect("Failed to install Prometheus metrics recorder"));

    // Initialize detector
    let layouts = LayoutCatalog::load(&config.layouts_dir).expect("Failed to load layout catalog");
    let detector = Arc::new(RasterSummaryDetector::new(layouts));

    // Initialize processing and result queues
    let jobs = Arc::new(WorkQueue::new());
    let results = Arc::new(WorkQueue::new());

    // Initialize result link to the server
    let sender = result_sender::result_sender(
        results.clone(),
        WsLink::new(&config.server_results_url),
        config.reconnect_policy(),
    );
    let result_link = sender.state();
    let processing = ProcessingLoop::new(detector, jobs.clone(), results.clone());

    // Create shared worker state
    let cancel = CancellationToken::new();
    let state = WorkerState::new(
        jobs,
        results,
        result_link,
        config.max_frame_bytes,
        cancel.clone(),
    );

    // Start processing slot and result sender
    let processing_task = tokio::spawn(processing.run(cancel.clone()));
    let sender_task = tokio::spawn(sender.run(cancel.clone()));
    tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));

    // Build worker routes
    let app = routes::worker_router(state).merge(routes::metrics_router(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Worker listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .expect("Server error");

    // Stop background loops
    cancel.cancel();
    for (name, task) in [("processing", processing_task), ("result sender", sender_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    }
    tracing::info!("Worker stopped");
}
