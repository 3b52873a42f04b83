use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;
use crate::tray::POPUP_TIMEOUT_MS;

pub const MIN_WEBHOOK_TIMEOUT_SECS: u64 = 1;
pub const MAX_WEBHOOK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
/// A shorter settle would open the next popup while the last is still up.
pub const MIN_TRAY_SETTLE_MS: u64 = POPUP_TIMEOUT_MS;
pub const MAX_TRAY_SETTLE_MS: u64 = 10_000;
/// How long a tray popup stays up before the next one is shown.
pub const DEFAULT_TRAY_SETTLE_MS: u64 = 3_500;
pub const MIN_FEED_CAPACITY: usize = 10;
pub const MAX_FEED_CAPACITY: usize = 1_000;
pub const DEFAULT_FEED_CAPACITY: usize = 200;

/// User preferences. Deserialized from `settings.toml` in the app config dir.
///
/// The pipeline never mutates a `Settings` in place; it reads an
/// `Arc<Settings>` snapshot from [`SettingsStore`] per decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Discord-style webhook endpoint. Empty disables the webhook channel.
    #[serde(default)]
    pub webhook_url: String,
    /// Notify on known pet-drop chat messages.
    #[serde(default = "enabled")]
    pub pet_notifications: bool,
    /// Item names that are always priority. Stored lowercase.
    #[serde(default)]
    pub priority_keywords: BTreeSet<String>,
    /// Suppress the fortune heuristic for slayer reward boxes.
    #[serde(default = "enabled")]
    pub ignore_slayer_boxes: bool,
    /// Treat any box/cache/crate/pack/present as priority.
    #[serde(default = "enabled")]
    pub fortune_heuristic: bool,
    #[serde(default)]
    pub channels: ChannelToggles,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            pet_notifications: true,
            priority_keywords: BTreeSet::new(),
            ignore_slayer_boxes: true,
            fortune_heuristic: true,
            channels: ChannelToggles::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Settings {
    /// Lowercases and trims every keyword, dropping empty ones.
    pub fn normalized(mut self) -> Self {
        self.priority_keywords = self
            .priority_keywords
            .iter()
            .filter_map(|k| normalize_keyword(k))
            .collect();
        self
    }

    /// Adds `item` to the priority list. Returns `false` if it was empty or
    /// already present.
    pub fn add_priority_keyword(&mut self, item: &str) -> bool {
        match normalize_keyword(item) {
            Some(keyword) => self.priority_keywords.insert(keyword),
            None => false,
        }
    }

    /// Removes `item` from the priority list, ignoring case.
    pub fn remove_priority_keyword(&mut self, item: &str) -> bool {
        match normalize_keyword(item) {
            Some(keyword) => self.priority_keywords.remove(&keyword),
            None => false,
        }
    }

    /// The webhook URL if one is configured.
    pub fn webhook_target(&self) -> Option<&str> {
        let url = self.webhook_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Per-channel enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelToggles {
    pub discord: bool,
    pub private_message: bool,
    pub tray: bool,
    pub sound: bool,
    pub feed: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            discord: true,
            private_message: true,
            tray: true,
            sound: true,
            feed: true,
        }
    }
}

/// Delivery tuning. Read once when the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Webhook request timeout in seconds. Clamped to [1, 30].
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Delay between tray popups in milliseconds. Clamped to [3000, 10000], never below the popup lifetime.
    #[serde(default = "default_tray_settle")]
    pub tray_settle_ms: u64,
    /// Number of lines kept in the loot feed. Clamped to [10, 1000].
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            tray_settle_ms: DEFAULT_TRAY_SETTLE_MS,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl DeliveryConfig {
    pub fn effective_webhook_timeout(&self) -> Duration {
        Duration::from_secs(
            self.webhook_timeout_secs
                .clamp(MIN_WEBHOOK_TIMEOUT_SECS, MAX_WEBHOOK_TIMEOUT_SECS),
        )
    }

    pub fn effective_tray_settle(&self) -> Duration {
        Duration::from_millis(self.tray_settle_ms.clamp(MIN_TRAY_SETTLE_MS, MAX_TRAY_SETTLE_MS))
    }

    pub fn effective_feed_capacity(&self) -> usize {
        self.feed_capacity.clamp(MIN_FEED_CAPACITY, MAX_FEED_CAPACITY)
    }
}

fn normalize_keyword(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Loads the settings file at `path`, returning `Settings::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
    Ok(settings.normalized())
}

/// Writes `settings` to `path` as TOML, creating the parent directory if needed.
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))
}

/// Owns the live settings and hands out consistent snapshots.
///
/// Writers build a complete new `Settings` and swap the `Arc` under the write
/// lock, so a reader always sees either the old or the new value in full.
/// The write lock is only held for the swap; edits and disk writes are
/// serialized by `write_lock` instead.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Arc<Settings>>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Opens the store backed by `path`, loading it or falling back to defaults
    /// when the file is missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let settings = load_or_default(&path)?;
        Ok(Self::with_settings(path, settings))
    }

    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(settings)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the backing file without touching the live snapshot.
    pub fn load(&self) -> Result<Settings> {
        load_or_default(&self.path)
    }

    /// Persists `settings` to the backing file.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        save(&self.path, settings)
    }

    /// Returns the current settings snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in a complete new settings value.
    pub fn replace(&self, settings: Settings) {
        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(Arc::new(settings));
    }

    /// Applies `edit` to a copy of the current settings. When `edit` reports a
    /// change the copy becomes the live snapshot and is then written to disk.
    /// A failed write is returned as an error; the new snapshot stays live.
    pub fn update<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Settings) -> bool,
    {
        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Settings::clone(&self.snapshot());
        if !edit(&mut next) {
            return Ok(false);
        }
        let next = Arc::new(next);
        self.swap(Arc::clone(&next));
        self.save(&next)?;
        Ok(true)
    }

    fn swap(&self, next: Arc<Settings>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Spawns a file watcher on the directory holding `store`'s file.  Whenever the
/// settings file is created or modified, reloads it and sends a
/// `SettingsReloaded` event.
pub async fn watch_settings(store: Arc<SettingsStore>, tx: mpsc::Sender<DaemonEvent>) {
    let path = store.path().to_path_buf();
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("[settings] Failed to create file watcher: {e}");
            return;
        }
    };

    // Editors save by writing a new file and renaming it over the old one,
    // which only shows up on the directory.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            tracing::warn!("[settings] Settings path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::warn!("[settings] Failed to watch settings directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_settings = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_settings && is_write {
            match store.load() {
                Ok(settings) => {
                    if tx.send(DaemonEvent::SettingsReloaded(settings)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("[settings] Failed to reload settings: {e:#}"),
            }
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

fn default_tray_settle() -> u64 {
    DEFAULT_TRAY_SETTLE_MS
}

fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}
