/// Game notices handed to the pipeline by the event source.
///
/// Both types are immutable once built; the pipeline consumes each one exactly
/// once and nothing here is persisted.
use serde::Deserialize;

/// A single stack of items inside a loot drop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub quantity: u32,
}

/// Loot received from an NPC (or any other named source).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LootEvent {
    /// NPC or message origin that produced the drop.
    #[serde(rename = "source")]
    pub source_name: String,
    /// Local player who received the drop.
    #[serde(rename = "player")]
    pub player_name: String,
    /// Item stacks in the order the game reported them.
    pub items: Vec<ItemStack>,
}

impl LootEvent {
    /// Returns `false` if any stack has a zero quantity.
    pub fn is_well_formed(&self) -> bool {
        self.items.iter().all(|item| item.quantity >= 1)
    }
}

/// A game chat message that may announce a pet drop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PetEvent {
    pub message: String,
}
