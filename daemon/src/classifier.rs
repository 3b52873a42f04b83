/// Priority classification for loot items and pet chat messages.
///
/// Everything here is a pure function of its input and a settings snapshot.
use crate::config::Settings;

/// Substrings that mark an item as a container under the fortune heuristic.
const FORTUNE_MARKERS: &[&str] = &["box", "cache", "crate", "pack", "present"];

/// Chat messages the game prints when a pet drops.
pub const PET_MESSAGES: &[&str] = &[
    "You have a funny feeling like you're being followed",
    "You feel something weird sneaking into your backpack",
    "You have a funny feeling like you would have been followed",
];

/// Why an input was (or was not) judged priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The item name is on the user's priority list.
    ExplicitKeyword,
    /// The fortune heuristic matched a container-like name.
    HeuristicMatch,
    /// A known pet-drop message.
    PetMessage,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub priority: bool,
    pub reason: Reason,
}

impl Classification {
    const fn matched(reason: Reason) -> Self {
        Self { priority: true, reason }
    }

    const fn ignored() -> Self {
        Self { priority: false, reason: Reason::None }
    }
}

/// Classifies one item of a loot event.
pub fn classify_item(item_name: &str, settings: &Settings) -> Classification {
    let lower = item_name.to_lowercase();

    if settings.priority_keywords.contains(&lower) {
        return Classification::matched(Reason::ExplicitKeyword);
    }

    if settings.fortune_heuristic
        && !is_exempt_slayer_box(&lower, settings)
        && FORTUNE_MARKERS.iter().any(|marker| lower.contains(marker))
    {
        return Classification::matched(Reason::HeuristicMatch);
    }

    Classification::ignored()
}

/// Classifies a game chat message as a pet drop.
pub fn classify_pet(message: &str, settings: &Settings) -> Classification {
    if settings.pet_notifications && PET_MESSAGES.iter().any(|known| message.contains(known)) {
        Classification::matched(Reason::PetMessage)
    } else {
        Classification::ignored()
    }
}

fn is_exempt_slayer_box(lower: &str, settings: &Settings) -> bool {
    settings.ignore_slayer_boxes && lower.contains("slayer") && lower.contains("box")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(fortune: bool, ignore_slayer: bool, keywords: &[&str]) -> Settings {
        let mut s = Settings::default();
        s.fortune_heuristic = fortune;
        s.ignore_slayer_boxes = ignore_slayer;
        for k in keywords {
            s.add_priority_keyword(k);
        }
        s
    }

    // ── keywords ──────────────────────────────────────────────────────────────

    #[test]
    fn keyword_match_is_priority_under_every_flag_combination() {
        for fortune in [false, true] {
            for ignore_slayer in [false, true] {
                let s = settings(fortune, ignore_slayer, &["Slayer's Enchanted Key Box"]);
                let c = classify_item("Slayer's Enchanted Key Box", &s);
                assert_eq!(c, Classification::matched(Reason::ExplicitKeyword));
            }
        }
    }

    #[test]
    fn keyword_match_ignores_item_case() {
        let s = settings(false, false, &["dragon claws"]);
        assert!(classify_item("DRAGON Claws", &s).priority);
    }

    #[test]
    fn keyword_must_match_whole_name() {
        let s = settings(false, false, &["claws"]);
        assert!(!classify_item("Dragon claws", &s).priority);
    }

    // ── fortune heuristic ─────────────────────────────────────────────────────

    #[test]
    fn every_fortune_marker_matches_when_enabled() {
        let s = settings(true, true, &[]);
        for name in ["Mystery Box", "Supply cache", "Reward Crate", "Seed pack", "Christmas Present"] {
            let c = classify_item(name, &s);
            assert_eq!(c, Classification::matched(Reason::HeuristicMatch), "{name}");
        }
    }

    #[test]
    fn heuristic_off_ignores_containers() {
        let s = settings(false, true, &[]);
        assert!(!classify_item("Mystery Box", &s).priority);
    }

    #[test]
    fn slayer_box_is_suppressed_when_ignoring_slayer_boxes() {
        let s = settings(true, true, &[]);
        let c = classify_item("Slayer's Enchanted Key Box", &s);
        assert_eq!(c, Classification::ignored());
    }

    #[test]
    fn slayer_box_matches_when_not_ignoring_slayer_boxes() {
        let s = settings(true, false, &[]);
        assert!(classify_item("Slayer's Enchanted Key Box", &s).priority);
    }

    #[test]
    fn slayer_exemption_needs_both_words() {
        // "slayer" without "box" is not exempt and still hits "crate".
        let s = settings(true, true, &[]);
        assert!(classify_item("Slayer supply crate", &s).priority);
    }

    // ── scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn grubby_key_is_not_priority_with_heuristic_off() {
        let s = settings(false, true, &[]);
        assert_eq!(classify_item("Grubby Key", &s), Classification::ignored());
    }

    #[test]
    fn mystery_box_is_priority_with_heuristic_on() {
        let s = settings(true, true, &[]);
        assert!(classify_item("Mystery Box", &s).priority);
    }

    // ── pets ──────────────────────────────────────────────────────────────────

    #[test]
    fn pet_message_matches_by_containment() {
        let s = Settings::default();
        let msg = format!("<col=ef1020>{}.</col>", PET_MESSAGES[1]);
        assert_eq!(classify_pet(&msg, &s), Classification::matched(Reason::PetMessage));
    }

    #[test]
    fn every_known_pet_message_matches() {
        let s = Settings::default();
        for msg in PET_MESSAGES {
            assert!(classify_pet(msg, &s).priority, "{msg}");
        }
    }

    #[test]
    fn pet_message_ignored_when_pet_notifications_disabled() {
        let mut s = Settings::default();
        s.pet_notifications = false;
        assert!(!classify_pet(PET_MESSAGES[0], &s).priority);
    }

    #[test]
    fn unrelated_chat_is_not_a_pet() {
        let s = Settings::default();
        assert!(!classify_pet("Welcome to the game. Present your ticket.", &s).priority);
    }
}
