use garde::Validate;
use serde::{Deserialize, Serialize};

use super::job::{PayloadShape, TaskId};

/// Query parameters accompanying a crop upload.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuery {
    #[garde(length(min = 1, max = 255))]
    pub layout_name: String,

    #[garde(range(min = 1))]
    pub width: Option<u32>,

    #[garde(range(min = 1))]
    pub height: Option<u32>,

    #[garde(range(min = 1, max = 64))]
    pub channels: Option<u32>,
}

impl SubmitQuery {
    /// Shape metadata, present only when both dimensions were supplied.
    pub fn shape(&self) -> Option<PayloadShape> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(PayloadShape {
                width,
                height,
                channels: self.channels,
            }),
            _ => None,
        }
    }
}

/// Legacy poll query (`GET /?task_id=...`).
#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub task_id: TaskId,
}

/// Response after submitting a crop.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
}

/// Returned when a poll gives up waiting on a task that is still in flight.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub task_id: TaskId,
    pub status: String,
}
