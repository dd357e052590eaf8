use std::sync::Arc;

use crate::models::result::TaskResult;
use crate::services::delivery::{DeliveryLoop, NoHooks};
use crate::services::link::{Link, ReconnectPolicy};
use crate::services::queue::WorkQueue;

/// Worker-side loop pushing finished results back to the server.
pub type ResultSender<L> = DeliveryLoop<TaskResult, L, NoHooks>;

pub fn result_sender<L: Link>(
    results: Arc<WorkQueue<TaskResult>>,
    link: L,
    policy: ReconnectPolicy,
) -> ResultSender<L> {
    DeliveryLoop::new("results", results, link, NoHooks, policy)
}
