//! Deterministic chance gate.
//!
//! Rules carry a percentage chance. A preview has to give the same answer on
//! every run, so instead of drawing a random number the gate hashes a stable
//! identity (character key + formatted rule) and compares it against the
//! chance. The formatted rule drops comments and spacing, so editing either
//! does not move the gate.
//!
//! The distribution is uniform over `0..100` but is not the host engine's RNG;
//! a gated rule may land on different characters in game.

use crate::DistributionFilter;
use crate::record::CharacterRecord;

/// `true` when a rule with `chance` applies to the entity identified by
/// `identity`. `chance >= 100` always passes, `chance == 0` never does.
pub fn chance_gate(identity: &str, chance: u8) -> bool {
    if chance >= 100 {
        return true;
    }
    if chance == 0 {
        return false;
    }
    roll(identity) < u64::from(chance)
}

fn roll(identity: &str) -> u64 {
    let hash = blake3::hash(identity.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix) % 100
}

/// Chance gate for one `(character, rule)` application.
pub(crate) fn passes(character: &CharacterRecord, filter: &DistributionFilter) -> bool {
    if filter.chance >= 100 {
        return true;
    }
    let identity = format!("{}|{}", character.key(), filter.format());
    chance_gate(&identity, filter.chance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CharacterData;
    use crate::{FormKey, KeywordTable, parse_line};

    #[test]
    fn bounds() {
        assert!(chance_gate("anything", 100));
        assert!(!chance_gate("anything", 0));
    }

    #[test]
    fn deterministic_and_roughly_uniform() {
        for i in 0..50 {
            let id = format!("npc-{i}");
            assert_eq!(chance_gate(&id, 40), chance_gate(&id, 40));
        }

        let passed = (0..2000).filter(|i| chance_gate(&format!("npc-{i}"), 50)).count();
        assert!((800..1200).contains(&passed), "passed {passed} of 2000");
    }

    #[test]
    fn monotonic_in_chance() {
        for i in 0..200 {
            let id = format!("npc-{i}");
            if chance_gate(&id, 30) {
                assert!(chance_gate(&id, 70));
            }
        }
    }

    #[test]
    fn comments_and_spacing_do_not_move_the_gate() {
        let table = KeywordTable::default();
        let plain = parse_line("Outfit = X|NONE|NONE|NONE|NONE|NONE|50", &table).unwrap();
        let variants = [
            "Outfit = X|NONE|NONE|NONE|NONE|NONE|50 ; note",
            "Outfit=X | NONE | NONE | NONE | NONE | NONE | 50",
            "  Outfit = X|NONE|NONE|NONE|NONE|NONE|50\t# moved to X",
        ];

        for text in variants {
            let other = parse_line(text, &table).unwrap();
            assert_eq!(other.format(), plain.format(), "{text}");
            for i in 0..200 {
                let character = CharacterRecord::new(CharacterData::new(FormKey::new("Skyrim.esm", i), format!("Npc{i}")));
                assert_eq!(passes(&character, &other), passes(&character, &plain), "{text} / {i}");
            }
        }
    }
}
