//! Dispatcher: moves jobs from the submission queue to the worker.
//!
//! A job's task id becomes pending in the registry the moment it is
//! handed to the link. If that send fails the pending entry is cleared
//! and the job returns to the head of the submission queue.

use std::sync::Arc;

use crate::models::job::Job;
use crate::services::delivery::{DeliveryHooks, DeliveryLoop};
use crate::services::link::{Link, ReconnectPolicy};
use crate::services::queue::WorkQueue;
use crate::services::registry::TaskRegistry;

pub struct RegistryHooks {
    registry: Arc<TaskRegistry>,
}

impl DeliveryHooks<Job> for RegistryHooks {
    fn before_send(&self, job: &Job) {
        self.registry.mark_pending(job.task_id);
    }

    fn after_failure(&self, job: &Job) {
        self.registry.clear_pending(job.task_id);
        metrics::counter!("tasks_requeued_total").increment(1);
    }
}

pub type Dispatcher<L> = DeliveryLoop<Job, L, RegistryHooks>;

pub fn dispatcher<L: Link>(
    submissions: Arc<WorkQueue<Job>>,
    registry: Arc<TaskRegistry>,
    link: L,
    policy: ReconnectPolicy,
) -> Dispatcher<L> {
    DeliveryLoop::new(
        "dispatch",
        submissions,
        link,
        RegistryHooks { registry },
        policy,
    )
}
