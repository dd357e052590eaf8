//! Queue-to-peer delivery loop shared by the dispatcher and the result
//! sender.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Sending -> Connected
//!                     |                         |
//!                     +-------> Disconnected <--+
//! ```
//!
//! One item is in flight at a time. An item whose send fails goes back to
//! the head of its queue before the loop reconnects, so it is delivered at
//! least once and never lost while the process is running. While idle the
//! loop watches the session, so a peer that went away is replaced before
//! the next item is taken off the queue.

use std::sync::Arc;

use serde::Serialize;
use strum::{AsRefStr, Display};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::job::TaskId;
use crate::services::link::{Link, ReconnectPolicy, Session};
use crate::services::queue::WorkQueue;

/// Items that can be pushed over a delivery loop.
pub trait Deliverable: Serialize + Send + Sync + 'static {
    fn task_id(&self) -> TaskId;
}

impl Deliverable for crate::models::job::Job {
    fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl Deliverable for crate::models::result::TaskResult {
    fn task_id(&self) -> TaskId {
        self.task_id
    }
}

/// Side effects tied to an item's delivery attempt.
pub trait DeliveryHooks<T>: Send + Sync + 'static {
    /// Runs after the item is popped, before the frame is written.
    fn before_send(&self, _item: &T) {}

    /// Runs when the attempt fails, before the item is requeued.
    fn after_failure(&self, _item: &T) {}
}

pub struct NoHooks;

impl<T> DeliveryHooks<T> for NoHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
    Stopped,
}

pub struct DeliveryLoop<T, L: Link, H> {
    channel: &'static str,
    queue: Arc<WorkQueue<T>>,
    link: L,
    hooks: H,
    policy: ReconnectPolicy,
    state: watch::Sender<DeliveryState>,
}

impl<T, L, H> DeliveryLoop<T, L, H>
where
    T: Deliverable,
    L: Link,
    H: DeliveryHooks<T>,
{
    /// * `channel` - short name used in logs and metric labels.
    pub fn new(
        channel: &'static str,
        queue: Arc<WorkQueue<T>>,
        link: L,
        hooks: H,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(DeliveryState::Disconnected);
        Self {
            channel,
            queue,
            link,
            hooks,
            policy,
            state,
        }
    }

    /// Observe state transitions (health checks, tests).
    pub fn state(&self) -> watch::Receiver<DeliveryState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: DeliveryState) {
        self.state.send_replace(next);
        tracing::trace!(channel = self.channel, state = %next, "Delivery state");
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut delay = self.policy.initial_delay;
        tracing::info!(
            channel = self.channel,
            peer = %self.link.describe(),
            "Delivery loop started"
        );

        loop {
            self.set_state(DeliveryState::Connecting);
            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self.link.open() => opened,
            };

            let mut session = match opened {
                Ok(session) => {
                    delay = self.policy.initial_delay;
                    session
                }
                Err(e) => {
                    self.set_state(DeliveryState::Disconnected);
                    tracing::warn!(
                        channel = self.channel,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Peer unreachable, will retry"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = self.policy.next_delay(delay);
                    continue;
                }
            };

            self.set_state(DeliveryState::Connected);
            if self.pump(&mut session, &cancel).await.is_break() {
                session.close().await;
                break;
            }
            self.set_state(DeliveryState::Disconnected);
        }

        self.set_state(DeliveryState::Stopped);
        tracing::info!(channel = self.channel, "Delivery loop stopped");
    }

    /// Send queued items over one session. Breaks on cancellation,
    /// continues (to reconnect) when the session fails.
    async fn pump(
        &self,
        session: &mut L::Session,
        cancel: &CancellationToken,
    ) -> std::ops::ControlFlow<()> {
        use std::ops::ControlFlow;

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ControlFlow::Break(()),
                _ = session.closed() => {
                    tracing::warn!(channel = self.channel, "Peer closed idle connection, reconnecting");
                    return ControlFlow::Continue(());
                }
                item = self.queue.pop() => item,
            };
            let task_id = item.task_id();

            self.hooks.before_send(&item);
            let frame = match serde_json::to_string(&item) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(
                        channel = self.channel,
                        task_id = %task_id,
                        error = %e,
                        "Failed to encode frame, dropping item"
                    );
                    self.hooks.after_failure(&item);
                    metrics::counter!("delivery_dropped_total", "channel" => self.channel)
                        .increment(1);
                    continue;
                }
            };

            self.set_state(DeliveryState::Sending);
            let sent = tokio::select! {
                _ = cancel.cancelled() => {
                    self.hooks.after_failure(&item);
                    self.queue.requeue(item);
                    return ControlFlow::Break(());
                }
                sent = session.send_text(frame) => sent,
            };

            match sent {
                Ok(()) => {
                    self.set_state(DeliveryState::Connected);
                    metrics::counter!("delivery_sent_total", "channel" => self.channel)
                        .increment(1);
                    tracing::info!(channel = self.channel, task_id = %task_id, "Delivered");
                }
                Err(e) => {
                    tracing::warn!(
                        channel = self.channel,
                        task_id = %task_id,
                        error = %e,
                        "Send failed, requeueing and reconnecting"
                    );
                    self.hooks.after_failure(&item);
                    self.queue.requeue(item);
                    metrics::counter!("delivery_requeued_total", "channel" => self.channel)
                        .increment(1);
                    return ControlFlow::Continue(());
                }
            }
        }
    }
}
