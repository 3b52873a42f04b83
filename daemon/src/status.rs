use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::tray::TrayState;

/// Current lifecycle state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Settings are loading and workers are being started.
    Starting,
    /// Events are being classified and dispatched.
    Running,
    /// Workers have drained and the daemon has exited its event loop.
    Stopped,
}

/// Runtime status written by the daemon to `status.toml`.
/// Front ends read this file (read-only) to display daemon state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    pub tray_queue: TrayState,
    /// Popups waiting behind the one on screen.
    pub tray_pending: usize,
    /// Webhook posts that returned 200 or 204.
    pub notifications_sent: u64,
    /// Webhook posts that failed, were rejected or never left the queue.
    pub notifications_dropped: u64,
    /// Summary of the most recent notification, e.g. "3x Mystery Box".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<String>,
    /// RFC 3339 timestamp of the most recent notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notification_timestamp: Option<String>,
    /// Human-readable error message if the daemon encountered a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Newest loot feed lines, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_feed: Vec<String>,
}

impl DaemonStatus {
    /// Constructs the initial status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Starting,
            tray_queue: TrayState::Idle,
            tray_pending: 0,
            notifications_sent: 0,
            notifications_dropped: 0,
            last_notification: None,
            last_notification_timestamp: None,
            error: None,
            recent_feed: Vec::new(),
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged and otherwise ignored.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("[status] Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!("[status] Failed to write status file: {e}");
            }
        }
        Err(e) => tracing::warn!("[status] Failed to serialize status: {e}"),
    }
}
