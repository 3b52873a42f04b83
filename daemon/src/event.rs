use crate::config::Settings;
use crate::loot::{LootEvent, PetEvent};

#[derive(Debug)]
pub enum DaemonEvent {
    /// The game client reported a loot drop.
    Loot(LootEvent),
    /// A game chat message that may announce a pet.
    GameMessage(PetEvent),
    /// Send the sample notification through every enabled channel.
    TestNotification,
    /// Drop every popup still waiting in the tray queue.
    ClearTray,
    /// Add an item name to the priority list and persist it.
    AddPriority(String),
    /// Remove an item name from the priority list and persist it.
    RemovePriority(String),
    /// The settings file changed on disk and was successfully re-parsed.
    SettingsReloaded(Settings),
    /// Input closed or Ctrl+C received; the daemon should drain and exit.
    Shutdown,
}
