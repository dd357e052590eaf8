//! In-memory link used by the delivery loop tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::services::link::{Link, LinkError, Session};

struct MockState {
    delivered: Mutex<Vec<String>>,
    online: watch::Sender<bool>,
    /// Bumped to sever every open session.
    generation: watch::Sender<u64>,
    fail_connects: AtomicUsize,
    fail_sends: AtomicUsize,
    drop_offline_on_failure: Mutex<bool>,
    open_attempts: AtomicUsize,
    closed_sessions: AtomicUsize,
}

#[derive(Clone)]
pub struct MockLink {
    state: Arc<MockState>,
}

impl MockLink {
    pub fn new() -> Self {
        let (online, _) = watch::channel(true);
        let (generation, _) = watch::channel(0);
        Self {
            state: Arc::new(MockState {
                delivered: Mutex::new(Vec::new()),
                online,
                generation,
                fail_connects: AtomicUsize::new(0),
                fail_sends: AtomicUsize::new(0),
                drop_offline_on_failure: Mutex::new(false),
                open_attempts: AtomicUsize::new(0),
                closed_sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// While offline, `open` waits until the link comes back.
    pub fn set_online(&self, online: bool) {
        self.state.online.send_replace(online);
    }

    /// Drop every open session from the peer side. A severed session
    /// accepts frames without delivering them, like a dead TCP socket.
    pub fn sever_sessions(&self) {
        self.state.generation.send_modify(|g| *g += 1);
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.state.fail_sends.store(n, Ordering::SeqCst);
    }

    /// Take the link offline as soon as a send fails, so the test can
    /// inspect state before the reconnect succeeds.
    pub fn go_offline_on_send_failure(&self) {
        *self.state.drop_offline_on_failure.lock() = true;
    }

    pub fn delivered(&self) -> Vec<String> {
        self.state.delivered.lock().clone()
    }

    pub fn delivered_as<T: DeserializeOwned>(&self) -> Vec<T> {
        self.delivered()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.closed_sessions.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    state: Arc<MockState>,
    generation: u64,
}

impl MockSession {
    fn is_severed(&self) -> bool {
        *self.state.generation.borrow() != self.generation
    }
}

#[async_trait]
impl Link for MockLink {
    type Session = MockSession;

    async fn open(&self) -> Result<MockSession, LinkError> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);

        let mut online = self.state.online.subscribe();
        online
            .wait_for(|up| *up)
            .await
            .map_err(|_| LinkError::Closed)?;

        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(LinkError::Connect("refused".to_string()));
        }

        Ok(MockSession {
            state: self.state.clone(),
            generation: *self.state.generation.borrow(),
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        if self.is_severed() {
            return Ok(());
        }
        let remaining = self.state.fail_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_sends.store(remaining - 1, Ordering::SeqCst);
            if *self.state.drop_offline_on_failure.lock() {
                self.state.online.send_replace(false);
            }
            return Err(LinkError::Closed);
        }
        self.state.delivered.lock().push(text);
        Ok(())
    }

    async fn closed(&mut self) {
        let mut generation = self.state.generation.subscribe();
        let opened = self.generation;
        let _ = generation.wait_for(|current| *current != opened).await;
    }

    async fn close(&mut self) {
        self.state.closed_sessions.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}
