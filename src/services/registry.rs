//! Task registry: correlates dispatched task ids with their results.
//!
//! An entry moves `absent -> pending -> completed -> absent`. The
//! dispatcher creates the pending entry when it hands a job to the worker,
//! the result receiver completes it, and the first lookup that sees it
//! completed removes it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::models::job::TaskId;
use crate::models::result::TaskResult;

enum Slot {
    Pending,
    Completed(TaskResult),
}

/// Observable state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Completed,
}

/// What happened to an incoming result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Stored,
    /// No entry for this id: never dispatched, already consumed, or requeued.
    Unknown,
    /// The entry already holds a result.
    Duplicate,
}

/// Answer to a lookup bounded by a timeout.
#[derive(Debug)]
pub enum Lookup {
    Ready(TaskResult),
    NotFound,
    StillPending,
}

#[derive(Default)]
pub struct TaskRegistry {
    slots: Mutex<HashMap<TaskId, Slot>>,
    changed: Notify,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a job has been handed to the worker.
    ///
    /// A completed entry is left untouched.
    pub fn mark_pending(&self, task_id: TaskId) {
        self.slots.lock().entry(task_id).or_insert(Slot::Pending);
    }

    /// Drop a pending entry whose dispatch failed. Returns whether an
    /// entry was removed.
    pub fn clear_pending(&self, task_id: TaskId) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            match slots.get(&task_id) {
                Some(Slot::Pending) => slots.remove(&task_id).is_some(),
                _ => false,
            }
        };
        if removed {
            self.changed.notify_waiters();
        }
        removed
    }

    /// Store a result against its pending entry.
    pub fn complete(&self, result: TaskResult) -> CompleteOutcome {
        let outcome = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&result.task_id) {
                Some(slot) => match *slot {
                    Slot::Pending => {
                        *slot = Slot::Completed(result);
                        CompleteOutcome::Stored
                    }
                    Slot::Completed(_) => CompleteOutcome::Duplicate,
                },
                None => CompleteOutcome::Unknown,
            }
        };
        if outcome == CompleteOutcome::Stored {
            self.changed.notify_waiters();
        }
        outcome
    }

    /// Take a completed result without waiting.
    pub fn take_completed(&self, task_id: TaskId) -> Option<TaskResult> {
        let mut slots = self.slots.lock();
        match slots.get(&task_id) {
            Some(Slot::Completed(_)) => match slots.remove(&task_id) {
                Some(Slot::Completed(result)) => Some(result),
                _ => None,
            },
            _ => None,
        }
    }

    /// Wait for the result of a registered task and remove it.
    ///
    /// Returns `None` immediately for an id with no entry. A pending entry
    /// suspends the caller until it completes, or returns `None` if the
    /// entry is cleared in the meantime.
    pub async fn await_result(&self, task_id: TaskId) -> Option<TaskResult> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut slots = self.slots.lock();
                match slots.get(&task_id) {
                    None => return None,
                    Some(Slot::Completed(_)) => {
                        if let Some(Slot::Completed(result)) = slots.remove(&task_id) {
                            return Some(result);
                        }
                    }
                    Some(Slot::Pending) => {}
                }
            }

            notified.await;
        }
    }

    /// Like [`await_result`](Self::await_result) but gives up after
    /// `wait`, leaving a pending entry in place.
    pub async fn await_result_timeout(&self, task_id: TaskId, wait: Duration) -> Lookup {
        match tokio::time::timeout(wait, self.await_result(task_id)).await {
            Ok(Some(result)) => Lookup::Ready(result),
            Ok(None) => Lookup::NotFound,
            Err(_) => Lookup::StillPending,
        }
    }

    pub fn status(&self, task_id: TaskId) -> Option<TaskState> {
        self.slots.lock().get(&task_id).map(|slot| match slot {
            Slot::Pending => TaskState::Pending,
            Slot::Completed(_) => TaskState::Completed,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Pending))
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Completed(_)))
            .count()
    }
}
