use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::TaskId;

/// What the detector produced for a job.
///
/// A failed detection still yields a result so that a waiting poll
/// always resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed { result: serde_json::Value },
    Failed { error: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Result record for one job, keyed by the job's task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub layout_name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn completed(
        task_id: TaskId,
        layout_name: impl Into<String>,
        result: serde_json::Value,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            layout_name: layout_name.into(),
            outcome: Outcome::Completed { result },
            started_at,
            finished_at,
        }
    }

    pub fn failed(
        task_id: TaskId,
        layout_name: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            layout_name: layout_name.into(),
            outcome: Outcome::Failed {
                error: error.into(),
            },
            started_at,
            finished_at,
        }
    }
}
