//! Worker processing slot.
//!
//! Pops one job at a time from the processing queue, runs the detector on
//! the blocking pool and queues the result. Detector errors and panics are
//! reported as failed results rather than dropped.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::models::job::{Job, PayloadShape};
use crate::models::result::TaskResult;
use crate::services::queue::WorkQueue;

/// Matches a crop against a named layout.
///
/// Implementations run on a blocking thread and must not share state with
/// the dispatch core.
pub trait Detector: Send + Sync + 'static {
    fn detect(
        &self,
        layout_name: &str,
        payload: &[u8],
        shape: Option<&PayloadShape>,
    ) -> Result<serde_json::Value, DetectionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Unknown layout: {0}")]
    UnknownLayout(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Detection failed: {0}")]
    Failed(String),
}

pub struct ProcessingLoop<D> {
    detector: Arc<D>,
    jobs: Arc<WorkQueue<Job>>,
    results: Arc<WorkQueue<TaskResult>>,
}

impl<D: Detector> ProcessingLoop<D> {
    pub fn new(
        detector: Arc<D>,
        jobs: Arc<WorkQueue<Job>>,
        results: Arc<WorkQueue<TaskResult>>,
    ) -> Self {
        Self {
            detector,
            jobs,
            results,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("Processing loop started");
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.jobs.pop() => job,
            };
            metrics::gauge!("processing_queue_depth").set(self.jobs.len() as f64);
            let task_id = job.task_id;

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(task_id = %task_id, "Shutdown during detection, job abandoned");
                    break;
                }
                result = self.process(job) => result,
            };
            self.results.push(result);
            metrics::gauge!("result_queue_depth").set(self.results.len() as f64);
        }
        tracing::info!("Processing loop stopped");
    }

    /// Run detection for one job and build its result.
    pub async fn process(&self, job: Job) -> TaskResult {
        let task_id = job.task_id;
        let layout_name = job.layout_name.clone();
        tracing::info!(task_id = %task_id, layout = %layout_name, "Start detection");

        let started_at = Utc::now();
        let timer = Instant::now();
        let detector = self.detector.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            detector.detect(&job.layout_name, &job.payload, job.shape.as_ref())
        })
        .await;
        let finished_at = Utc::now();
        let elapsed = timer.elapsed();
        metrics::histogram!("detection_seconds").record(elapsed.as_secs_f64());

        match outcome {
            Ok(Ok(value)) => {
                tracing::info!(
                    task_id = %task_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Task processed"
                );
                metrics::counter!("tasks_processed_total").increment(1);
                TaskResult::completed(task_id, layout_name, value, started_at, finished_at)
            }
            Ok(Err(e)) => {
                tracing::error!(task_id = %task_id, error = %e, "Detection failed");
                metrics::counter!("tasks_failed_total").increment(1);
                TaskResult::failed(task_id, layout_name, e.to_string(), started_at, finished_at)
            }
            Err(join_error) => {
                tracing::error!(task_id = %task_id, error = %join_error, "Detector panicked");
                metrics::counter!("tasks_failed_total").increment(1);
                TaskResult::failed(
                    task_id,
                    layout_name,
                    format!("detector aborted: {join_error}"),
                    started_at,
                    finished_at,
                )
            }
        }
    }
}
