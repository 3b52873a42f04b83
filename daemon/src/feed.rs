use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};

use crate::config::{MAX_FEED_CAPACITY, MIN_FEED_CAPACITY};

/// Pending appends waiting for the feed task.
const FEED_CHANNEL_CAPACITY: usize = 256;

/// One entry in the loot feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLine {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl fmt::Display for FeedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Bounded history of feed lines, oldest first.
///
/// Holds at most `capacity` lines (clamped to
/// [`MIN_FEED_CAPACITY`]–[`MAX_FEED_CAPACITY`]).  When full, the oldest line is
/// evicted to make room for the newest.
pub struct LootFeed {
    lines: VecDeque<FeedLine>,
    capacity: usize,
}

impl LootFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: Self::clamp_capacity(capacity),
        }
    }

    /// Pushes a new line, evicting the oldest if the feed is at capacity.
    pub fn push(&mut self, line: FeedLine) {
        if self.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Returns the newest `count` lines rendered for display, oldest first.
    pub fn recent(&self, count: usize) -> Vec<String> {
        if count == 0 || self.is_empty() {
            return Vec::new();
        }
        let skip = self.len().saturating_sub(count);
        self.lines.iter().skip(skip).map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn clamp_capacity(capacity: usize) -> usize {
        capacity.clamp(MIN_FEED_CAPACITY, MAX_FEED_CAPACITY)
    }
}

/// Cloneable, thread-safe entry point for appending to the feed.
///
/// Appends are timestamped at the call site and forwarded to the feed task,
/// which is the only code that mutates the [`LootFeed`].
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedLine>,
}

impl FeedHandle {
    /// Creates a handle and the receiver the feed task drains.
    pub fn channel() -> (Self, mpsc::Receiver<FeedLine>) {
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queues `text` for the feed. Never blocks; a full or closed feed drops
    /// the line.
    pub fn append_line(&self, text: impl Into<String>) {
        let line = FeedLine {
            timestamp: Local::now(),
            text: text.into(),
        };
        if let Err(e) = self.tx.try_send(line) {
            tracing::debug!("[feed] Dropped feed line: {e}");
        }
    }
}

/// Feed loop: applies queued lines to `feed` in arrival order until `stop_rx`
/// flips or every [`FeedHandle`] is dropped.
pub async fn run_feed(
    mut rx: mpsc::Receiver<FeedLine>,
    feed: Arc<Mutex<LootFeed>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                tracing::info!("[feed] {line}");
                feed.lock().unwrap_or_else(PoisonError::into_inner).push(line);
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    // Apply anything queued before the stop signal.
    while let Ok(line) = rx.try_recv() {
        feed.lock().unwrap_or_else(PoisonError::into_inner).push(line);
    }
}
