use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::event::DaemonEvent;
use crate::loot::{LootEvent, PetEvent};

/// One line of input from the game client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command {
    Loot(LootEvent),
    GameMessage(PetEvent),
    TestNotification,
    ClearTray,
    AddPriority { item: String },
    RemovePriority { item: String },
}

impl From<Command> for DaemonEvent {
    fn from(command: Command) -> Self {
        match command {
            Command::Loot(event) => DaemonEvent::Loot(event),
            Command::GameMessage(pet) => DaemonEvent::GameMessage(pet),
            Command::TestNotification => DaemonEvent::TestNotification,
            Command::ClearTray => DaemonEvent::ClearTray,
            Command::AddPriority { item } => DaemonEvent::AddPriority(item),
            Command::RemovePriority { item } => DaemonEvent::RemovePriority(item),
        }
    }
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<DaemonEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let command: Command = serde_json::from_str(line).context("not a recognised event")?;
    if let Command::Loot(event) = &command {
        if !event.is_well_formed() {
            bail!("loot from '{}' has an item with quantity 0", event.source_name);
        }
    }
    Ok(Some(command.into()))
}

/// Reads newline-delimited JSON events from stdin until EOF, then requests
/// shutdown.
pub async fn run(tx: mpsc::Sender<DaemonEvent>) {
    run_reader(BufReader::new(tokio::io::stdin()), tx).await;
}

/// Reads events from `reader`. Malformed lines are logged and skipped.
pub async fn run_reader<R: AsyncBufRead + Unpin>(reader: R, tx: mpsc::Sender<DaemonEvent>) {
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("[source] Input closed");
                break;
            }
            Err(e) => {
                tracing::warn!("[source] Failed to read input: {e}");
                break;
            }
        };
        line_no += 1;

        match parse_line(&line) {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[source] Skipping line {line_no}: {e:#}"),
        }
    }

    let _ = tx.send(DaemonEvent::Shutdown).await;
}
