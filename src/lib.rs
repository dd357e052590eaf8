//! Layout registration dispatch
//!
//! Accepts image crops to be registered against a named layout, queues them,
//! pushes each job to a single worker over a persistent WebSocket, and
//! correlates the worker's asynchronously produced results back to the
//! submitter by task id.
//!
//! The server binary (`src/main.rs`) owns the submission queue, the
//! dispatcher and the task registry. The worker binary (`src/bin/worker.rs`)
//! owns the processing queue, the single detection slot and the result
//! sender.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod telemetry;
