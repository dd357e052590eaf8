use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::job::Job;
use crate::models::result::TaskResult;
use crate::services::delivery::DeliveryState;
use crate::services::intake::ConnectionGate;
use crate::services::queue::WorkQueue;
use crate::services::registry::TaskRegistry;
use crate::services::submission::SubmissionService;

/// Shared state of the submission-facing server.
#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<SubmissionService>,
    pub registry: Arc<TaskRegistry>,
    /// Current state of the dispatcher's link to the worker.
    pub dispatch_link: watch::Receiver<DeliveryState>,
    /// Longest a poll waits before answering "still pending".
    pub result_wait: Duration,
    /// Fires on shutdown; releases long polls and inbound channels.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        submissions: SubmissionService,
        registry: Arc<TaskRegistry>,
        dispatch_link: watch::Receiver<DeliveryState>,
        result_wait: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            submissions: Arc::new(submissions),
            registry,
            dispatch_link,
            result_wait,
            shutdown,
        }
    }
}

/// Shared state of the worker process.
#[derive(Clone)]
pub struct WorkerState {
    pub jobs: Arc<WorkQueue<Job>>,
    pub results: Arc<WorkQueue<TaskResult>>,
    pub intake_gate: ConnectionGate,
    /// Current state of the result sender's link to the server.
    pub result_link: watch::Receiver<DeliveryState>,
    /// Largest job frame accepted on the dispatch channel.
    pub max_frame_bytes: usize,
    pub shutdown: CancellationToken,
}

impl WorkerState {
    pub fn new(
        jobs: Arc<WorkQueue<Job>>,
        results: Arc<WorkQueue<TaskResult>>,
        result_link: watch::Receiver<DeliveryState>,
        max_frame_bytes: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            results,
            intake_gate: ConnectionGate::default(),
            result_link,
            max_frame_bytes,
            shutdown,
        }
    }
}
