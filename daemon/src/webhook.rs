/// Webhook delivery: payload shape, HTTP transport and the delivery worker.
///
/// Dispatch never performs network I/O itself. It hands a [`WebhookRequest`]
/// to the worker through a bounded queue and returns; the worker posts one
/// request at a time, logs failures and counts the outcome in
/// [`DeliveryStats`]. Nothing is retried.
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Embed color used for every notification (green).
pub const EMBED_COLOR: u32 = 65_280;
/// Requests waiting for the worker before new ones are dropped.
pub const WEBHOOK_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected the request (status {0})")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
}

/// JSON body posted to the webhook: `{"embeds":[{...}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

impl WebhookPayload {
    pub fn single(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            embeds: vec![Embed {
                title: title.into(),
                description: description.into(),
                color: EMBED_COLOR,
            }],
        }
    }
}

/// One queued delivery.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub payload: WebhookPayload,
}

/// Sends a payload to a URL and reports the HTTP status.
pub trait WebhookTransport: Send + Sync + 'static {
    fn send(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> impl Future<Output = Result<u16, WebhookError>> + Send;
}

/// `reqwest`-backed transport with a client-wide timeout.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loot-herald/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl WebhookTransport for HttpTransport {
    async fn send(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError> {
        let resp = self.http.post(url).json(payload).send().await?;
        Ok(resp.status().as_u16())
    }
}

/// 200 and 204 are the only statuses that count as delivered.
pub fn is_success(status: u16) -> bool {
    status == 200 || status == 204
}

/// Delivery counters shared between the worker and status reporting.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Cloneable producer side of the webhook queue.
#[derive(Clone)]
pub struct WebhookHandle {
    tx: mpsc::Sender<WebhookRequest>,
    stats: Arc<DeliveryStats>,
}

impl WebhookHandle {
    /// Queues `request` without waiting. A full or stopped worker counts the
    /// request as dropped.
    pub fn submit(&self, request: WebhookRequest) {
        if let Err(e) = self.tx.try_send(request) {
            tracing::warn!("[webhook] Notification dropped before sending: {e}");
            self.stats.record_dropped();
        }
    }
}

/// A running webhook worker.
pub struct WebhookWorker {
    /// Setting this to `true` asks the worker to finish its queue and exit.
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WebhookWorker {
    /// Spawns the worker and returns it with the handle dispatch submits to.
    pub fn start<T: WebhookTransport>(transport: T, stats: Arc<DeliveryStats>) -> (Self, WebhookHandle) {
        let (tx, rx) = mpsc::channel(WEBHOOK_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker_stats = Arc::clone(&stats);
        let handle = tokio::spawn(async move {
            run_worker(transport, rx, stop_rx, worker_stats).await;
        });

        (WebhookWorker { stop_tx, handle }, WebhookHandle { tx, stats })
    }

    /// Signals the worker to stop and waits for it to drain and exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn run_worker<T: WebhookTransport>(
    transport: T,
    mut rx: mpsc::Receiver<WebhookRequest>,
    mut stop_rx: watch::Receiver<bool>,
    stats: Arc<DeliveryStats>,
) {
    tracing::debug!("[webhook] Worker started");

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else { break };
                deliver(&transport, &request, &stats).await;
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    // Requests accepted before the stop signal still get their one attempt.
    rx.close();
    while let Some(request) = rx.recv().await {
        deliver(&transport, &request, &stats).await;
    }

    tracing::debug!("[webhook] Worker stopped");
}

async fn deliver<T: WebhookTransport>(transport: &T, request: &WebhookRequest, stats: &DeliveryStats) {
    match transport.send(&request.url, &request.payload).await {
        Ok(status) if is_success(status) => {
            stats.record_sent();
        }
        Ok(status) => {
            tracing::warn!("[webhook] {}", WebhookError::Status(status));
            stats.record_dropped();
        }
        Err(e) => {
            tracing::warn!("[webhook] {e}");
            stats.record_dropped();
        }
    }
}
