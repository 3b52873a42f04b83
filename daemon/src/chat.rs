/// Local in-game private messages.
///
/// The daemon has no game client of its own, so announcements go back to
/// whoever is feeding it events: one JSON object per line on stdout.
use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

/// Sender name shown in the game chat box.
pub const CHAT_SENDER: &str = "<img=46> Loot";

/// Synchronous, in-process announcement. Must not do network I/O.
pub trait ChatSink: Send + Sync + 'static {
    fn announce(&self, sender: &str, text: &str);
}

#[derive(Debug, Serialize)]
struct PrivateMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    sender: &'a str,
    text: &'a str,
}

/// Renders a private message as a single JSON line (no trailing newline).
pub fn render_line(sender: &str, text: &str) -> serde_json::Result<String> {
    serde_json::to_string(&PrivateMessage {
        kind: "private_message",
        sender,
        text,
    })
}

/// Writes private messages to any `Write`, one JSON line each.
pub struct JsonLineChat<W: Write + Send + 'static> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLineChat<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl JsonLineChat<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> ChatSink for JsonLineChat<W> {
    fn announce(&self, sender: &str, text: &str) {
        let line = match render_line(sender, text) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("[chat] Failed to encode message: {e}");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::warn!("[chat] Failed to write message: {e}");
        }
    }
}
