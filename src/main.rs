use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use layout_dispatch::{
    app_state::AppState,
    config::ServerConfig,
    routes,
    services::{
        dispatcher, layouts::LayoutCatalog, link::WsLink, queue::WorkQueue,
        registry::TaskRegistry, submission::SubmissionService,
    },
    shutdown, telemetry,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing layout dispatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle =
        Arc::new(telemetry::install_metrics().expect("Failed to install Prometheus metrics recorder"));

    // Load the layout catalog
    let layouts = LayoutCatalog::load(&config.layouts_dir).expect("Failed to load layout catalog");
    if layouts.is_empty() {
        tracing::warn!(dir = %config.layouts_dir, "No layouts found, every submission will be rejected");
    }

    // Initialize submission queue and task registry
    let submissions = Arc::new(WorkQueue::new());
    let registry = Arc::new(TaskRegistry::new());

    // Initialize dispatcher link to the worker
    let dispatcher = dispatcher::dispatcher(
        submissions.clone(),
        registry.clone(),
        WsLink::new(&config.worker_tasks_url),
        config.reconnect_policy(),
    );
    let dispatch_link = dispatcher.state();

    // Create shared application state
    let cancel = CancellationToken::new();
    let state = AppState::new(
        SubmissionService::new(submissions, registry.clone(), Arc::new(layouts)),
        registry,
        dispatch_link,
        config.result_wait(),
        cancel.clone(),
    );

    // Start background loops
    let dispatcher_task = tokio::spawn(dispatcher.run(cancel.clone()));
    tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));

    // Build API routes
    let app = routes::server_router(state, config.max_payload_bytes)
        .merge(routes::metrics_router(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .expect("Server error");

    // Stop background loops
    cancel.cancel();
    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "Dispatcher task failed");
    }
    tracing::info!("Graceful shutdown complete");
}
