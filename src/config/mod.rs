use std::time::Duration;

use serde::Deserialize;

use crate::services::link::ReconnectPolicy;

/// Submission-facing server configuration (unprefixed environment).
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_server_bind_addr")]
    pub bind_addr: String,

    /// Worker WebSocket endpoint jobs are dispatched to.
    #[serde(default = "default_worker_tasks_url")]
    pub worker_tasks_url: String,

    /// Directory holding the layout rasters; file names are the valid
    /// `layout_name` values.
    #[serde(default = "default_layouts_dir")]
    pub layouts_dir: String,

    /// Upper bound on an uploaded crop, in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// How long a poll waits for a pending task before answering 202.
    #[serde(default = "default_result_wait_timeout_secs")]
    pub result_wait_timeout_secs: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

/// Worker configuration (`WORKER_`-prefixed environment).
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// Worker bind address for the dispatch WebSocket.
    #[serde(default = "default_worker_bind_addr")]
    pub bind_addr: String,

    /// Server WebSocket endpoint results are sent to.
    #[serde(default = "default_server_results_url")]
    pub server_results_url: String,

    #[serde(default = "default_layouts_dir")]
    pub layouts_dir: String,

    /// Upper bound on one inbound job frame, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_server_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_worker_bind_addr() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_worker_tasks_url() -> String {
    "ws://127.0.0.1:8888/ws/tasks".to_string()
}

fn default_server_results_url() -> String {
    "ws://127.0.0.1:8000/ws/results".to_string()
}

fn default_layouts_dir() -> String {
    "./layouts".to_string()
}

fn default_max_payload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_frame_bytes() -> usize {
    // Base64 inflates the payload by a third.
    96 * 1024 * 1024
}

fn default_result_wait_timeout_secs() -> u64 {
    300
}

fn default_reconnect_initial_ms() -> u64 {
    250
}

fn default_reconnect_max_ms() -> u64 {
    10_000
}

fn reconnect_policy(initial_ms: u64, max_ms: u64) -> ReconnectPolicy {
    ReconnectPolicy::new(
        Duration::from_millis(initial_ms.max(1)),
        Duration::from_millis(max_ms.max(initial_ms.max(1))),
    )
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        reconnect_policy(self.reconnect_initial_ms, self.reconnect_max_ms)
    }

    pub fn result_wait(&self) -> Duration {
        Duration::from_secs(self.result_wait_timeout_secs)
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("WORKER_").from_env()
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        reconnect_policy(self.reconnect_initial_ms, self.reconnect_max_ms)
    }
}
