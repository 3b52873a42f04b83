mod chat;
mod classifier;
mod config;
mod dispatcher;
mod event;
mod feed;
mod loot;
mod paths;
mod pipeline;
mod sound;
mod source;
mod status;
mod tray;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::event::DaemonEvent;
use crate::pipeline::{LootPipeline, Outputs};

/// How often status.toml is refreshed while running.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries private messages, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        tracing::error!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    // ── Settings ──────────────────────────────────────────────────────────────
    let settings_path = paths::settings_file_path();
    let store = match config::SettingsStore::open(settings_path.clone()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("[settings] Error (using defaults): {e:#}");
            current_status.error = Some(format!("Settings error: {e:#}"));
            config::SettingsStore::with_settings(settings_path, config::Settings::default())
        }
    };
    let store = Arc::new(store);

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let timeout = store.snapshot().delivery.effective_webhook_timeout();
    let transport = match webhook::HttpTransport::new(timeout) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("[webhook] Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let pipeline = LootPipeline::start(
        Arc::clone(&store),
        transport,
        Outputs {
            chat: Arc::new(chat::JsonLineChat::stdout()),
            display: Arc::new(tray::DesktopNotifier),
            sound: sound::default_player(),
        },
    );

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_settings(Arc::clone(&store), event_tx.clone()));
    tokio::spawn(source::run(event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    current_status.state = status::DaemonState::Running;
    status::write_status(&status_path, &current_status);
    tracing::info!("loot-herald-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);

    loop {
        let evt = tokio::select! {
            evt = event_rx.recv() => evt,
            _ = ticker.tick() => {
                pipeline.fill_status(&mut current_status);
                status::write_status(&status_path, &current_status);
                continue;
            }
        };
        let Some(evt) = evt else { break };

        match evt {
            DaemonEvent::Loot(event) => {
                pipeline.on_loot_event(&event);
            }

            DaemonEvent::GameMessage(pet) => {
                pipeline.on_pet_message(&pet.message);
            }

            DaemonEvent::TestNotification => {
                tracing::info!("Sending test notification");
                pipeline.test_notification();
            }

            DaemonEvent::ClearTray => {
                pipeline.clear_tray();
            }

            DaemonEvent::AddPriority(item) => match pipeline.add_priority(&item) {
                Ok(true) => tracing::info!("[settings] Added priority item '{}'", item.trim()),
                Ok(false) => tracing::info!("[settings] '{}' is empty or already a priority item", item.trim()),
                Err(e) => {
                    tracing::warn!("[settings] Failed to save priority list: {e:#}");
                    current_status.error = Some(format!("Settings save failed: {e:#}"));
                }
            },

            DaemonEvent::RemovePriority(item) => match pipeline.remove_priority(&item) {
                Ok(true) => tracing::info!("[settings] Removed priority item '{}'", item.trim()),
                Ok(false) => tracing::info!("[settings] '{}' was not a priority item", item.trim()),
                Err(e) => {
                    tracing::warn!("[settings] Failed to save priority list: {e:#}");
                    current_status.error = Some(format!("Settings save failed: {e:#}"));
                }
            },

            DaemonEvent::SettingsReloaded(settings) => {
                tracing::info!("Settings reloaded");
                pipeline.apply_settings(settings);
                current_status.error = None;
            }

            DaemonEvent::Shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    pipeline.fill_status(&mut current_status);
    let stats = pipeline.stop().await;
    current_status.state = status::DaemonState::Stopped;
    current_status.tray_queue = tray::TrayState::Idle;
    current_status.tray_pending = 0;
    current_status.notifications_sent = stats.sent();
    current_status.notifications_dropped = stats.dropped();
    status::write_status(&status_path, &current_status);

    // The stdin reader may still be parked in a blocking read, which would
    // keep the runtime from shutting down.
    std::process::exit(0);
}
