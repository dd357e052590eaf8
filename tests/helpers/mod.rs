//! Test helpers: an in-process server and worker wired over real
//! WebSockets on ephemeral ports

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use layout_dispatch::{
    app_state::{AppState, WorkerState},
    models::{
        job::{Job, PayloadShape, TaskId},
        result::TaskResult,
        task::SubmitResponse,
    },
    routes,
    services::{
        dispatcher,
        layouts::LayoutCatalog,
        link::{ReconnectPolicy, WsLink},
        processing::{DetectionError, Detector, ProcessingLoop},
        queue::WorkQueue,
        registry::TaskRegistry,
        result_sender,
        submission::SubmissionService,
    },
};
use reqwest::multipart;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::fixtures::{CropFixture, FAILING_PAYLOAD, LAYOUTS};

/// Upper bound on one crop in the test server
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Detector stand-in: echoes the layout and payload size after `delay`,
/// fails on [`FAILING_PAYLOAD`]
pub struct StubDetector {
    pub delay: Duration,
}

impl StubDetector {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

impl Detector for StubDetector {
    fn detect(
        &self,
        layout_name: &str,
        payload: &[u8],
        _shape: Option<&PayloadShape>,
    ) -> Result<serde_json::Value, DetectionError> {
        std::thread::sleep(self.delay);
        if payload == FAILING_PAYLOAD {
            return Err(DetectionError::Failed("stub rejected payload".to_string()));
        }
        Ok(serde_json::json!({
            "layout": layout_name,
            "bytes": payload.len(),
        }))
    }
}

pub fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(100))
}

pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// Listen again on an address a stopped process was using.
pub fn rebind(addr: SocketAddr) -> TcpListener {
    let socket = TcpSocket::new_v4().expect("create socket");
    socket.set_reuseaddr(true).expect("set SO_REUSEADDR");
    socket.bind(addr).expect("rebind address");
    socket.listen(1024).expect("listen")
}

/// Stop a process's loops and wait for its HTTP server to release the port.
async fn shut_down(cancel: &CancellationToken, serve: &mut JoinHandle<()>) {
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), serve)
        .await
        .expect("server did not stop")
        .expect("server task panicked");
}

/// Running submission-facing server
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub base_url: String,
    pub state: AppState,
    pub submissions: Arc<WorkQueue<Job>>,
    worker_addr: SocketAddr,
    result_wait: Duration,
    cancel: CancellationToken,
    serve: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop the dispatcher, close the result channel and release the port.
    pub async fn stop(&mut self) {
        shut_down(&self.cancel, &mut self.serve).await;
    }
}

/// Running worker
pub struct WorkerHandle {
    pub addr: SocketAddr,
    pub state: WorkerState,
    server_addr: SocketAddr,
    cancel: CancellationToken,
    serve: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the processing slot and result sender, drop the dispatch
    /// connection and release the port.
    pub async fn stop(&mut self) {
        shut_down(&self.cancel, &mut self.serve).await;
    }
}

pub async fn start_server(
    listener: TcpListener,
    worker_addr: SocketAddr,
    result_wait: Duration,
    cancel: &CancellationToken,
) -> ServerHandle {
    let cancel = cancel.child_token();
    let addr = listener.local_addr().expect("local addr");
    let submissions = Arc::new(WorkQueue::new());
    let registry = Arc::new(TaskRegistry::new());

    let dispatcher = dispatcher::dispatcher(
        submissions.clone(),
        registry.clone(),
        WsLink::new(format!("ws://{worker_addr}/ws/tasks")),
        fast_reconnect(),
    );

    let state = AppState::new(
        SubmissionService::new(
            submissions.clone(),
            registry.clone(),
            Arc::new(LayoutCatalog::from_names(LAYOUTS.iter().copied())),
        ),
        registry,
        dispatcher.state(),
        result_wait,
        cancel.clone(),
    );

    tokio::spawn(dispatcher.run(cancel.clone()));

    let app = routes::server_router(state.clone(), MAX_PAYLOAD_BYTES);
    let shutdown = cancel.clone();
    let serve = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .expect("server");
    });

    ServerHandle {
        addr,
        base_url: format!("http://{addr}"),
        state,
        submissions,
        worker_addr,
        result_wait,
        cancel,
        serve,
    }
}

pub async fn start_worker(
    listener: TcpListener,
    server_addr: SocketAddr,
    detector: StubDetector,
    cancel: &CancellationToken,
) -> WorkerHandle {
    let cancel = cancel.child_token();
    let addr = listener.local_addr().expect("local addr");
    let jobs = Arc::new(WorkQueue::new());
    let results = Arc::new(WorkQueue::new());

    let sender = result_sender::result_sender(
        results.clone(),
        WsLink::new(format!("ws://{server_addr}/ws/results")),
        fast_reconnect(),
    );
    let state = WorkerState::new(
        jobs.clone(),
        results.clone(),
        sender.state(),
        MAX_PAYLOAD_BYTES * 2,
        cancel.clone(),
    );

    let processing = ProcessingLoop::new(Arc::new(detector), jobs, results);
    tokio::spawn(processing.run(cancel.clone()));
    tokio::spawn(sender.run(cancel.clone()));

    let app = routes::worker_router(state.clone());
    let shutdown = cancel.clone();
    let serve = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .expect("worker");
    });

    WorkerHandle {
        addr,
        state,
        server_addr,
        cancel,
        serve,
    }
}

/// Server and worker connected to each other
pub struct Cluster {
    pub server: ServerHandle,
    pub worker: WorkerHandle,
    pub cancel: CancellationToken,
    pub client: reqwest::Client,
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Cluster {
    /// Replace the worker with a fresh one on the same port.
    pub async fn restart_worker(&mut self, detector: StubDetector) {
        let (addr, server_addr) = (self.worker.addr, self.worker.server_addr);
        self.worker.stop().await;
        self.worker = start_worker(rebind(addr), server_addr, detector, &self.cancel).await;
    }

    /// Replace the server with a fresh one on the same port. Its registry
    /// starts empty.
    pub async fn restart_server(&mut self) {
        let (addr, worker_addr, result_wait) = (
            self.server.addr,
            self.server.worker_addr,
            self.server.result_wait,
        );
        self.server.stop().await;
        self.server = start_server(rebind(addr), worker_addr, result_wait, &self.cancel).await;
        // Pooled connections point at the old server.
        self.client = reqwest::Client::new();
    }
}

pub async fn start_cluster(detector: StubDetector, result_wait: Duration) -> Cluster {
    let cancel = CancellationToken::new();
    let (server_listener, server_addr) = bind_local().await;
    let (worker_listener, worker_addr) = bind_local().await;

    let worker = start_worker(worker_listener, server_addr, detector, &cancel).await;
    let server = start_server(server_listener, worker_addr, result_wait, &cancel).await;

    Cluster {
        server,
        worker,
        cancel,
        client: reqwest::Client::new(),
    }
}

/// POST a crop to /api/v1/tasks
pub async fn submit_crop(
    client: &reqwest::Client,
    base_url: &str,
    fixture: &CropFixture,
) -> Result<reqwest::Response, reqwest::Error> {
    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(fixture.payload.clone()).file_name("crop.bin"),
    );

    client
        .post(format!("{}/api/v1/tasks", base_url))
        .query(&[("layout_name", fixture.layout_name)])
        .multipart(form)
        .send()
        .await
}

/// Submit a crop and return its task id, failing the test on error
pub async fn submit_ok(client: &reqwest::Client, base_url: &str, fixture: &CropFixture) -> TaskId {
    let response = submit_crop(client, base_url, fixture)
        .await
        .expect("submit request");
    assert!(
        response.status().is_success(),
        "submit of {} failed with {}",
        fixture.description,
        response.status()
    );
    response
        .json::<SubmitResponse>()
        .await
        .expect("submit response body")
        .task_id
}

/// GET /api/v1/tasks/{task_id}
pub async fn poll_task(
    client: &reqwest::Client,
    base_url: &str,
    task_id: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .get(format!("{}/api/v1/tasks/{}", base_url, task_id))
        .send()
        .await
}

/// Poll until the result is available.
///
/// A 404 right after submission means the job has not been dispatched yet,
/// and a 202 means the server-side wait elapsed; both are retried.
pub async fn poll_until_ready(
    client: &reqwest::Client,
    base_url: &str,
    task_id: TaskId,
    timeout: Duration,
) -> TaskResult {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let response = poll_task(client, base_url, &task_id.to_string())
            .await
            .expect("poll request");

        match response.status().as_u16() {
            200 => return response.json::<TaskResult>().await.expect("result body"),
            202 | 404 => {}
            other => panic!("unexpected poll status {other} for {task_id}"),
        }

        if tokio::time::Instant::now() >= deadline {
            panic!("task {task_id} did not complete within {timeout:?}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}
