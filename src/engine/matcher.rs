//! Filter evaluation against one character.
//!
//! ```text
//! strings ∧ forms ∧ level ∧ traits          (absent section = true)
//!    │
//!    └─ section = exclusions hold ∧ (no expressions ∨ any expression holds)
//!         │
//!         └─ expression = every condition holds
//!              │
//!              └─ condition = hit(part) XOR part.negated
//! ```
//!
//! String parts look at the character's name, editor id, template editor id
//! and keywords. Form parts look at the character's own key and its resolved
//! references, in a fixed priority order.
//!
//! The matcher never touches the record store: every reference it needs has
//! already been flattened into the `CharacterRecord`.

use crate::grammar::{FormKey, Identifier, parse_identifier};
use crate::record::{CharacterRecord, RecordRef, TraitFlags};
use crate::{DistributionFilter, FilterPart, FilterSection, LevelEntry, TraitFilters};
use std::collections::HashSet;

/// True when `filter` selects `character` given its stored keywords.
pub fn matches(character: &CharacterRecord, filter: &DistributionFilter) -> bool {
    evaluate(character, filter, None)
}

/// Like [`matches`], but keyword tests also consult `working_keywords`
/// (lower-cased), which holds keywords handed out earlier in a simulation.
pub fn matches_with_keywords(
    character: &CharacterRecord,
    filter: &DistributionFilter,
    working_keywords: &HashSet<String>,
) -> bool {
    evaluate(character, filter, Some(working_keywords))
}

fn evaluate(character: &CharacterRecord, filter: &DistributionFilter, working: Option<&HashSet<String>>) -> bool {
    traits_match(character.traits(), &filter.traits)
        && levels_match(character, &filter.levels)
        && section_matches(&filter.strings, |part| string_hit(character, working, part))
        && section_matches(&filter.forms, |part| form_hit(character, part))
}

fn section_matches(section: &FilterSection, hit: impl Fn(&FilterPart) -> bool) -> bool {
    let holds = |part: &FilterPart| hit(part) != part.negated;

    if !section.exclusions.iter().all(holds) {
        return false;
    }
    section.expressions.is_empty() || section.expressions.iter().any(|expr| expr.conditions().all(holds))
}

// --- String parts ---------------------------------------------------------------

fn string_hit(character: &CharacterRecord, working: Option<&HashSet<String>>, part: &FilterPart) -> bool {
    let needle = part.value.to_lowercase();

    if !part.is_wildcard() {
        return character.match_keys().contains(&needle) || working.is_some_and(|w| w.contains(&needle));
    }

    let data = character.data();
    let texts = std::iter::once(data.editor_id.as_str())
        .chain(data.name.as_deref())
        .chain(data.template.as_ref().and_then(|t| t.editor_id.as_deref()));

    texts.map(str::to_lowercase).any(|t| t.contains(&needle))
        || character.keywords().iter().any(|k| k.contains(&needle))
        || working.is_some_and(|w| w.iter().any(|k| k.contains(&needle)))
}

// --- Form parts -----------------------------------------------------------------

/// `(key, editor id)` of the character and every reference it carries, in the
/// order form filters test them: self, race, class, factions, combat style,
/// voice, outfit, template.
fn references(character: &CharacterRecord) -> Vec<(&FormKey, Option<&str>)> {
    let data = character.data();
    let mut refs = vec![(&data.key, Some(data.editor_id.as_str()))];

    refs.extend(single(&data.race));
    refs.extend(single(&data.class));
    refs.extend(data.factions.iter().map(|f| (&f.key, f.editor_id.as_deref())));
    refs.extend(single(&data.combat_style));
    refs.extend(single(&data.voice));
    refs.extend(single(&data.default_outfit));
    refs.extend(single(&data.template));
    refs
}

fn single(r: &Option<RecordRef>) -> Option<(&FormKey, Option<&str>)> {
    r.as_ref().map(|r| (&r.key, r.editor_id.as_deref()))
}

fn form_hit(character: &CharacterRecord, part: &FilterPart) -> bool {
    let refs = references(character);

    if part.is_wildcard() {
        let needle = part.value.to_lowercase();
        return refs.iter().filter_map(|(_, edid)| *edid).any(|edid| edid.to_lowercase().contains(&needle));
    }

    match parse_identifier(&part.value) {
        Some(Identifier::Plugin(plugin)) => character.source_plugin().eq_ignore_ascii_case(&plugin),
        Some(Identifier::FormKey(key)) => refs.iter().any(|(k, _)| **k == key),
        Some(Identifier::FormId(id)) => refs.iter().any(|(k, _)| k.id == id),
        Some(Identifier::Symbol { name, plugin }) => refs.iter().any(|(k, edid)| {
            edid.is_some_and(|e| e.eq_ignore_ascii_case(&name))
                && plugin.as_ref().is_none_or(|p| k.plugin.eq_ignore_ascii_case(p))
        }),
        None => false,
    }
}

// --- Level and traits -------------------------------------------------------------

fn levels_match(character: &CharacterRecord, entries: &[LevelEntry]) -> bool {
    let level = character.level();
    entries.iter().all(|entry| match *entry {
        LevelEntry::Min(min) => level >= min,
        LevelEntry::Range(min, max) => level >= min && level <= max,
        // Skill-qualified entries are recognized but not evaluated.
        LevelEntry::Skill { .. } => true,
    })
}

fn traits_match(flags: TraitFlags, traits: &TraitFilters) -> bool {
    let checks = [
        (traits.female, TraitFlags::FEMALE),
        (traits.unique, TraitFlags::UNIQUE),
        (traits.summonable, TraitFlags::SUMMONABLE),
        (traits.child, TraitFlags::CHILD),
        (traits.leveled, TraitFlags::LEVELED),
        (traits.teammate, TraitFlags::TEAMMATE),
        (traits.dead, TraitFlags::DEAD),
    ];
    checks.iter().all(|(wanted, flag)| wanted.is_none_or(|w| flags.contains(*flag) == w))
}
