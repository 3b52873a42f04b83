/// Serialized tray popups.
///
/// [`TrayQueue`] owns a FIFO of [`TrayJob`]s and at most one drain worker.
/// The worker shows one popup, waits the settle delay, then takes the next
/// job.  Both the "start a worker" decision in [`TrayQueue::enqueue`] and the
/// "queue is empty, go idle" decision in the worker are made while holding the
/// queue lock, so a job can never be left behind by an exiting worker and two
/// workers can never run at once.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const POPUP_TITLE: &str = "Loot Tracker";
/// How long the desktop keeps a popup on screen. The settle delay between
/// popups is never shorter than this.
pub const POPUP_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupStyle {
    /// "You received {text}!"
    Received,
    /// The text as-is.
    Verbatim,
}

/// A popup waiting to be shown.
#[derive(Debug, Clone)]
pub struct TrayJob {
    pub display_text: String,
    pub enqueued_at: Instant,
    pub style: PopupStyle,
}

impl TrayJob {
    pub fn received(display_text: impl Into<String>) -> Self {
        Self::new(display_text.into(), PopupStyle::Received)
    }

    pub fn verbatim(display_text: impl Into<String>) -> Self {
        Self::new(display_text.into(), PopupStyle::Verbatim)
    }

    fn new(display_text: String, style: PopupStyle) -> Self {
        Self {
            display_text,
            enqueued_at: Instant::now(),
            style,
        }
    }

    /// Popup body text.
    pub fn body(&self) -> String {
        match self.style {
            PopupStyle::Received => format!("You received {}!", self.display_text),
            PopupStyle::Verbatim => self.display_text.clone(),
        }
    }
}

/// Something that can put a popup on screen. Called from a blocking thread.
pub trait TrayDisplay: Send + Sync + 'static {
    fn show(&self, job: &TrayJob) -> Result<()>;
}

/// Desktop notification via the platform notification service.
pub struct DesktopNotifier;

impl TrayDisplay for DesktopNotifier {
    fn show(&self, job: &TrayJob) -> Result<()> {
        notify_rust::Notification::new()
            .summary(POPUP_TITLE)
            .body(&job.body())
            .timeout(notify_rust::Timeout::Milliseconds(POPUP_TIMEOUT_MS as u32))
            .show()
            .map_err(|e| anyhow::anyhow!("desktop notification unavailable: {e}"))?;
        Ok(())
    }
}

/// Observable queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrayState {
    /// No worker is running.
    Idle,
    /// A worker is showing popups.
    Draining,
}

struct QueueState {
    jobs: VecDeque<TrayJob>,
    draining: bool,
    closed: bool,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<QueueState>,
    display: Arc<dyn TrayDisplay>,
    settle: Duration,
    runtime: Handle,
    stop_tx: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered, single-worker popup queue. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct TrayQueue {
    shared: Arc<Shared>,
}

impl TrayQueue {
    /// Creates an idle queue. Must be called from within a tokio runtime; the
    /// queue spawns its worker on that runtime even when `enqueue` is called
    /// from a plain thread.
    pub fn new(display: Arc<dyn TrayDisplay>, settle: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    draining: false,
                    closed: false,
                    worker: None,
                }),
                display,
                settle,
                runtime: Handle::current(),
                stop_tx,
            }),
        }
    }

    /// Appends `job` and starts the drain worker if none is running.
    /// Returns immediately.
    pub fn enqueue(&self, job: TrayJob) {
        let mut state = self.shared.lock();
        if state.closed {
            tracing::debug!("[tray] Queue is shut down; dropping '{}'", job.display_text);
            return;
        }
        state.jobs.push_back(job);
        if !state.draining {
            state.draining = true;
            let shared = Arc::clone(&self.shared);
            state.worker = Some(self.shared.runtime.spawn(drain(shared)));
        }
    }

    /// Drops every pending job and returns how many were dropped. A popup that
    /// is already on screen is not affected.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        let dropped = state.jobs.len();
        state.jobs.clear();
        dropped
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    pub fn state(&self) -> TrayState {
        if self.shared.lock().draining {
            TrayState::Draining
        } else {
            TrayState::Idle
        }
    }

    /// Clears the queue, refuses further jobs and waits for the worker to
    /// finish the popup it is showing.
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.jobs.clear();
            state.worker.take()
        };
        self.shared.stop_tx.send_replace(true);
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

async fn drain(shared: Arc<Shared>) {
    let mut stop_rx = shared.stop_tx.subscribe();

    loop {
        let job = {
            let mut state = shared.lock();
            match state.jobs.pop_front() {
                Some(job) => job,
                None => {
                    // Same critical section as the emptiness check.
                    state.draining = false;
                    return;
                }
            }
        };

        tracing::debug!(
            waited_ms = job.enqueued_at.elapsed().as_millis() as u64,
            "[tray] Showing '{}'",
            job.display_text
        );

        let display = Arc::clone(&shared.display);
        match tokio::task::spawn_blocking(move || display.show(&job)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("[tray] Skipped popup: {e:#}"),
            Err(e) => tracing::warn!("[tray] Popup task panicked: {e}"),
        }

        if *stop_rx.borrow() {
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(shared.settle) => {}
            _ = stop_rx.changed() => {}
        }
    }
}
