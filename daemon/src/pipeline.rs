/// Classification + dispatch pipeline for the lifetime of the daemon.
///
/// A `LootPipeline` is started once settings are loaded and stopped on
/// shutdown.  It owns:
///   - the webhook delivery worker
///   - the loot feed task
///   - the tray popup queue (inside the dispatcher)
///
/// Entry points (`on_loot_event`, `on_pet_message`, ...) take a fresh settings
/// snapshot per call and never block on delivery.
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tokio::{sync::watch, task::JoinHandle};

use crate::chat::ChatSink;
use crate::classifier::{classify_item, classify_pet};
use crate::config::{Settings, SettingsStore};
use crate::dispatcher::{Dispatcher, LastNotification};
use crate::feed::{self, FeedHandle, LootFeed};
use crate::loot::LootEvent;
use crate::sound::SoundPlayer;
use crate::status::DaemonStatus;
use crate::tray::{TrayDisplay, TrayQueue};
use crate::webhook::{DeliveryStats, WebhookTransport, WebhookWorker};

/// Feed lines mirrored into status.toml.
const STATUS_FEED_LINES: usize = 10;

/// Local side effects the pipeline drives besides the webhook.
pub struct Outputs {
    pub chat: Arc<dyn ChatSink>,
    pub display: Arc<dyn TrayDisplay>,
    pub sound: Arc<dyn SoundPlayer>,
}

/// A running classification + dispatch pipeline.
pub struct LootPipeline {
    store: Arc<SettingsStore>,
    dispatcher: Dispatcher,
    stats: Arc<DeliveryStats>,
    feed: Arc<Mutex<LootFeed>>,
    webhook: WebhookWorker,
    /// Setting this to `true` signals the feed task to stop.
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl LootPipeline {
    /// Starts the pipeline, reading settings from `store`.  Webhook posts go
    /// through `transport`.
    pub fn start<T: WebhookTransport>(store: Arc<SettingsStore>, transport: T, outputs: Outputs) -> Self {
        let settings = store.snapshot();
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles = vec![];

        // ── Webhook worker ────────────────────────────────────────────────────
        let stats = Arc::new(DeliveryStats::default());
        let (webhook, webhook_handle) = WebhookWorker::start(transport, Arc::clone(&stats));

        // ── Feed task ─────────────────────────────────────────────────────────
        let feed = Arc::new(Mutex::new(LootFeed::new(
            settings.delivery.effective_feed_capacity(),
        )));
        let (feed_handle, feed_rx) = FeedHandle::channel();
        {
            let feed = Arc::clone(&feed);
            handles.push(tokio::spawn(feed::run_feed(feed_rx, feed, stop_rx)));
        }

        // ── Tray queue ────────────────────────────────────────────────────────
        let tray = TrayQueue::new(outputs.display, settings.delivery.effective_tray_settle());

        let dispatcher = Dispatcher::new(webhook_handle, outputs.chat, tray, outputs.sound, feed_handle);

        tracing::info!(
            "[pipeline] Started (webhook {}, {} priority items)",
            if settings.webhook_target().is_some() { "configured" } else { "not configured" },
            settings.priority_keywords.len()
        );

        LootPipeline {
            store,
            dispatcher,
            stats,
            feed,
            webhook,
            stop_tx,
            handles,
        }
    }

    /// Classifies every item of `event` and dispatches the priority ones.
    /// Returns how many items were dispatched.
    pub fn on_loot_event(&self, event: &LootEvent) -> usize {
        if !event.is_well_formed() {
            tracing::warn!(
                "[pipeline] Ignoring loot from '{}' with a zero quantity",
                event.source_name
            );
            return 0;
        }

        let settings = self.store.snapshot();
        let mut dispatched = 0;
        for item in &event.items {
            let decision = classify_item(&item.name, &settings);
            if decision.priority {
                tracing::debug!("[pipeline] '{}' is priority ({:?})", item.name, decision.reason);
                self.dispatcher.dispatch_loot(item, event, &settings);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Dispatches `message` if it announces a pet. Returns whether it did.
    pub fn on_pet_message(&self, message: &str) -> bool {
        let settings = self.store.snapshot();
        let decision = classify_pet(message, &settings);
        if decision.priority {
            self.dispatcher.dispatch_pet(message, &settings);
        }
        decision.priority
    }

    pub fn test_notification(&self) {
        let settings = self.store.snapshot();
        self.dispatcher.send_test_notification(&settings);
    }

    /// Drops every queued popup. Returns how many were dropped.
    pub fn clear_tray(&self) -> usize {
        let dropped = self.dispatcher.tray().clear();
        tracing::info!("[pipeline] Cleared {dropped} pending popup(s)");
        dropped
    }

    /// Adds `item` to the priority list and persists the change.
    pub fn add_priority(&self, item: &str) -> Result<bool> {
        self.store.update(|s| s.add_priority_keyword(item))
    }

    /// Removes `item` from the priority list and persists the change.
    pub fn remove_priority(&self, item: &str) -> Result<bool> {
        self.store.update(|s| s.remove_priority_keyword(item))
    }

    /// Swaps in settings that were edited on disk.
    pub fn apply_settings(&self, settings: Settings) {
        self.store.replace(settings);
    }

    pub fn last_notification(&self) -> Option<LastNotification> {
        self.dispatcher.last_notification()
    }

    /// Newest `count` feed lines, oldest first.
    pub fn recent_feed(&self, count: usize) -> Vec<String> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner).recent(count)
    }

    /// Copies queue and delivery counters into `status`.
    pub fn fill_status(&self, status: &mut DaemonStatus) {
        let tray = self.dispatcher.tray();
        status.tray_queue = tray.state();
        status.tray_pending = tray.pending();
        status.notifications_sent = self.stats.sent();
        status.notifications_dropped = self.stats.dropped();
        if let Some(last) = self.last_notification() {
            status.last_notification = Some(last.text);
            status.last_notification_timestamp = Some(last.at.to_rfc3339());
        }
        status.recent_feed = self.recent_feed(STATUS_FEED_LINES);
    }

    /// Signals all sub-tasks to stop and waits for them to finish.  Queued
    /// webhook posts still get their one attempt; pending popups are dropped.
    /// Returns the final delivery counters.
    pub async fn stop(self) -> Arc<DeliveryStats> {
        let _ = self.stop_tx.send(true);
        self.dispatcher.tray().shutdown().await;
        self.webhook.stop().await;
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!(
            "[pipeline] Stopped ({} sent, {} dropped)",
            self.stats.sent(),
            self.stats.dropped()
        );
        self.stats
    }
}
