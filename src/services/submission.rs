//! Submission-facing operations: accept a crop, hand back its task id, and
//! later resolve that id to a result.

use std::sync::Arc;
use std::time::Duration;

use crate::models::job::{Job, PayloadShape, TaskId};
use crate::models::result::TaskResult;
use crate::services::layouts::LayoutCatalog;
use crate::services::queue::WorkQueue;
use crate::services::registry::{Lookup, TaskRegistry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("layout name is empty")]
    MissingLayout,

    #[error("unknown layout: {0}")]
    UnknownLayout(String),
}

pub struct SubmissionService {
    submissions: Arc<WorkQueue<Job>>,
    registry: Arc<TaskRegistry>,
    layouts: Arc<LayoutCatalog>,
}

impl SubmissionService {
    pub fn new(
        submissions: Arc<WorkQueue<Job>>,
        registry: Arc<TaskRegistry>,
        layouts: Arc<LayoutCatalog>,
    ) -> Self {
        Self {
            submissions,
            registry,
            layouts,
        }
    }

    /// Queue a crop for dispatch and return its task id without waiting.
    pub fn submit(
        &self,
        layout_name: &str,
        payload: Vec<u8>,
        shape: Option<PayloadShape>,
    ) -> Result<TaskId, SubmitError> {
        if layout_name.is_empty() {
            return Err(SubmitError::MissingLayout);
        }
        if payload.is_empty() {
            return Err(SubmitError::EmptyPayload);
        }
        if !self.layouts.contains(layout_name) {
            return Err(SubmitError::UnknownLayout(layout_name.to_string()));
        }

        let job = Job::new(layout_name, payload, shape);
        let task_id = job.task_id;
        tracing::info!(
            task_id = %task_id,
            layout = %layout_name,
            payload_bytes = job.payload.len(),
            "Task submitted"
        );
        self.submissions.push(job);

        metrics::counter!("tasks_submitted_total").increment(1);
        metrics::gauge!("submission_queue_depth").set(self.submissions.len() as f64);
        Ok(task_id)
    }

    /// Wait for a dispatched task's result and consume it.
    ///
    /// Ids that have not been dispatched yet are reported as not found
    /// without waiting.
    pub async fn await_result(&self, task_id: TaskId) -> Option<TaskResult> {
        self.registry.await_result(task_id).await
    }

    pub async fn await_result_timeout(&self, task_id: TaskId, wait: Duration) -> Lookup {
        self.registry.await_result_timeout(task_id, wait).await
    }

    pub fn queued(&self) -> usize {
        self.submissions.len()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn layouts(&self) -> &LayoutCatalog {
        &self.layouts
    }
}
