//! Inbound channel loops.
//!
//! The worker reads jobs from the dispatch connection into its processing
//! queue; the server reads results from the result connection into the
//! task registry. Both loops end cleanly when the peer disconnects.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::models::job::Job;
use crate::models::result::TaskResult;
use crate::services::queue::WorkQueue;
use crate::services::registry::{CompleteOutcome, TaskRegistry};

/// Counts for one inbound connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntakeStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Allows one inbound connection at a time.
#[derive(Clone)]
pub struct ConnectionGate {
    permits: Arc<Semaphore>,
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }
}

impl ConnectionGate {
    /// `None` while another connection holds the gate.
    pub fn try_enter(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }

    pub fn is_occupied(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

/// Decode each frame of `stream` and hand it to `accept`.
async fn drain_frames<S, E, T>(
    channel: &'static str,
    mut stream: S,
    mut accept: impl FnMut(T) -> bool,
) -> IntakeStats
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    T: DeserializeOwned,
{
    let mut stats = IntakeStats::default();

    while let Some(frame) = stream.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => serde_json::from_str::<T>(text.as_str()),
            Ok(Message::Binary(bytes)) => serde_json::from_slice::<T>(&bytes),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(channel, error = %e, "Inbound connection error");
                break;
            }
        };

        match decoded {
            Ok(item) => {
                if accept(item) {
                    stats.accepted += 1;
                } else {
                    stats.rejected += 1;
                }
            }
            Err(e) => {
                tracing::warn!(channel, error = %e, "Undecodable frame skipped");
                stats.rejected += 1;
            }
        }
    }

    tracing::info!(
        channel,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "Inbound connection closed"
    );
    stats
}

/// Worker side: queue every job received from the dispatcher.
pub async fn receive_jobs<S, E>(stream: S, jobs: &WorkQueue<Job>) -> IntakeStats
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    drain_frames("dispatch", stream, |job: Job| {
        tracing::debug!(task_id = %job.task_id, layout = %job.layout_name, "New task from server");
        jobs.push(job);
        metrics::counter!("tasks_received_total").increment(1);
        true
    })
    .await
}

/// Server side: record every result received from the worker.
pub async fn receive_results<S, E>(stream: S, registry: &TaskRegistry) -> IntakeStats
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    drain_frames("results", stream, |result: TaskResult| {
        let task_id = result.task_id;
        let failed = result.outcome.is_failed();
        match registry.complete(result) {
            CompleteOutcome::Stored => {
                tracing::info!(task_id = %task_id, failed, "Result received");
                metrics::counter!("results_received_total").increment(1);
                true
            }
            CompleteOutcome::Unknown => {
                tracing::warn!(task_id = %task_id, "Result for unknown task discarded");
                metrics::counter!("results_discarded_total", "reason" => "unknown").increment(1);
                false
            }
            CompleteOutcome::Duplicate => {
                tracing::warn!(task_id = %task_id, "Duplicate result discarded");
                metrics::counter!("results_discarded_total", "reason" => "duplicate").increment(1);
                false
            }
        }
    })
    .await
}
