// In-process ingestion server answering `PUT /bus/location`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use driver_tracking_lib::tracking::LocationUpdate;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone)]
pub struct MockSink {
    received: Arc<Mutex<Vec<LocationUpdate>>>,
    requests: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    failure_status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            received: Arc::default(),
            requests: Arc::default(),
            failures_left: Arc::default(),
            failure_status: Arc::new(AtomicU16::new(500)),
            delay_ms: Arc::default(),
        }
    }
}

impl MockSink {
    /// Bodies that were accepted with 200
    pub fn received(&self) -> Vec<LocationUpdate> {
        self.received.lock().expect("received lock").clone()
    }

    /// Every request, including rejected ones
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Reject the next `n` requests with `status`
    pub fn fail_next(&self, n: usize, status: u16) {
        self.failure_status.store(status, Ordering::SeqCst);
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Hold every response for `delay` before answering
    pub fn respond_after(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

async fn put_location(
    State(sink): State<MockSink>,
    Json(update): Json<LocationUpdate>,
) -> (StatusCode, &'static str) {
    sink.requests.fetch_add(1, Ordering::SeqCst);

    let delay_ms = sink.delay_ms.load(Ordering::SeqCst);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let rejected = sink
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if rejected {
        let status = StatusCode::from_u16(sink.failure_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "rejected");
    }

    sink.received.lock().expect("received lock").push(update);
    (StatusCode::OK, "Location updated")
}

pub struct MockServer {
    pub base_url: String,
    pub sink: MockSink,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let sink = MockSink::default();
        let app = Router::new()
            .route("/bus/location", put(put_location))
            .with_state(sink.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server listener");
        let address: SocketAddr = listener.local_addr().expect("mock listener local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            server.await.expect("run mock server");
        });

        Self {
            base_url: format!("http://{address}"),
            sink,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.expect("join mock server");
        }
    }
}
