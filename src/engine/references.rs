//! Form-reference resolution.
//!
//! Turns the raw text of every predicate in a parsed filter into a typed
//! reference against the record store:
//!
//! ```text
//! string part ── character (editor id, name) ─▶ keyword ─▶ virtual keyword
//! form part   ── key (every category) ─▶ editor id in LOOKUP_ORDER
//! ```
//!
//! Anything that does not resolve is kept verbatim as
//! [`Resolution::Unresolved`]. Rule files routinely reference plugins that are
//! not loaded, and those lines must survive a save untouched.
//!
//! Virtual keywords (keywords that only exist as the output of another rule)
//! come in as an immutable [`VirtualKeywords`] snapshot, so resolution stays a
//! pure function of `(filter, store, snapshot)`.

use crate::grammar::{Identifier, parse_identifier};
use crate::record::{RecordInfo, RecordKind, RecordStore};
use crate::{DistributionFilter, FilterPart, TargetKind};
use std::collections::BTreeSet;

/// Editor-id lookup order for form parts. First hit wins.
const LOOKUP_ORDER: [RecordKind; 9] = [
    RecordKind::Faction,
    RecordKind::Race,
    RecordKind::Class,
    RecordKind::CombatStyle,
    RecordKind::Outfit,
    RecordKind::Perk,
    RecordKind::VoiceType,
    RecordKind::Location,
    RecordKind::FormList,
];

/// Categories tried for a key; a bare key says nothing about its type.
const KEY_CATEGORIES: [RecordKind; 11] = [
    RecordKind::Npc,
    RecordKind::Faction,
    RecordKind::Race,
    RecordKind::Class,
    RecordKind::CombatStyle,
    RecordKind::Outfit,
    RecordKind::Perk,
    RecordKind::VoiceType,
    RecordKind::Location,
    RecordKind::FormList,
    RecordKind::Keyword,
];

/// Keywords produced by keyword rules, lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualKeywords {
    names: BTreeSet<String>,
}

impl VirtualKeywords {
    /// Snapshot of every keyword-rule target in `filters`.
    pub fn from_filters<'a>(filters: impl IntoIterator<Item = &'a DistributionFilter>) -> Self {
        let names = filters
            .into_iter()
            .filter(|f| f.kind == TargetKind::Keyword)
            .map(|f| f.form.trim().to_lowercase())
            .collect();
        VirtualKeywords { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Record(RecordInfo),
    Plugin(String),
    VirtualKeyword(String),
    /// Wildcard part; matched by substring, never looked up.
    Pattern(String),
    /// Raw text kept as written.
    Unresolved(String),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPart {
    pub part: FilterPart,
    pub resolution: Resolution,
}

/// Typed view of a filter. Parts appear in section order (exclusions first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilter {
    pub target: Resolution,
    pub strings: Vec<ResolvedPart>,
    pub forms: Vec<ResolvedPart>,
}

impl ResolvedFilter {
    /// Target first, then every string and form part.
    pub fn references(&self) -> impl Iterator<Item = &Resolution> {
        std::iter::once(&self.target).chain(self.strings.iter().chain(self.forms.iter()).map(|p| &p.resolution))
    }

    /// Text of every reference that did not resolve.
    pub fn residue(&self) -> Vec<&str> {
        self.references()
            .filter_map(|r| match r {
                Resolution::Unresolved(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub fn resolve_filter(
    filter: &DistributionFilter,
    store: &dyn RecordStore,
    virtual_keywords: &VirtualKeywords,
) -> ResolvedFilter {
    let strings = filter
        .strings
        .parts()
        .map(|part| ResolvedPart { part: part.clone(), resolution: resolve_string_part(part, store, virtual_keywords) })
        .collect();
    let forms = filter
        .forms
        .parts()
        .map(|part| ResolvedPart { part: part.clone(), resolution: resolve_form_part(part, store) })
        .collect();

    ResolvedFilter { target: resolve_target(filter, store, virtual_keywords), strings, forms }
}

fn unresolved(text: &str) -> Resolution {
    tracing::debug!(reference = text, "unresolved reference kept as raw text");
    Resolution::Unresolved(text.to_string())
}

fn resolve_string_part(part: &FilterPart, store: &dyn RecordStore, virtual_keywords: &VirtualKeywords) -> Resolution {
    if part.is_wildcard() {
        return Resolution::Pattern(part.value.clone());
    }
    let value = part.value.as_str();

    let character = store.find_by_editor_id(RecordKind::Npc, value).or_else(|| {
        store.records(RecordKind::Npc).find(|r| r.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(value)))
    });
    if let Some(record) = character.or_else(|| store.find_by_editor_id(RecordKind::Keyword, value)) {
        return Resolution::Record(record.clone());
    }
    if virtual_keywords.contains(value) {
        return Resolution::VirtualKeyword(value.to_string());
    }
    unresolved(value)
}

fn resolve_form_part(part: &FilterPart, store: &dyn RecordStore) -> Resolution {
    let value = part.value.as_str();
    if part.is_wildcard() {
        return Resolution::Pattern(value.to_string());
    }

    let found = match parse_identifier(value) {
        Some(Identifier::Plugin(plugin)) => return Resolution::Plugin(plugin),
        Some(Identifier::FormKey(key)) => KEY_CATEGORIES.iter().find_map(|&kind| store.resolve(kind, &key)),
        Some(Identifier::FormId(id)) => {
            KEY_CATEGORIES.iter().find_map(|&kind| store.records(kind).find(|r| r.key.id == id))
        }
        Some(Identifier::Symbol { name, plugin }) => LOOKUP_ORDER.iter().find_map(|&kind| {
            store
                .find_by_editor_id(kind, &name)
                .filter(|r| plugin.as_ref().is_none_or(|p| r.key.plugin.eq_ignore_ascii_case(p)))
        }),
        None => None,
    };

    match found {
        Some(record) => Resolution::Record(record.clone()),
        None => unresolved(value),
    }
}

fn target_kind(kind: TargetKind) -> RecordKind {
    match kind {
        TargetKind::Spell | TargetKind::LevSpell => RecordKind::Spell,
        TargetKind::Perk => RecordKind::Perk,
        TargetKind::Item | TargetKind::DeathItem | TargetKind::Skin => RecordKind::Item,
        TargetKind::Shout => RecordKind::Shout,
        TargetKind::Package => RecordKind::Package,
        TargetKind::Outfit | TargetKind::SleepOutfit => RecordKind::Outfit,
        TargetKind::Keyword => RecordKind::Keyword,
        TargetKind::Faction => RecordKind::Faction,
    }
}

fn resolve_target(filter: &DistributionFilter, store: &dyn RecordStore, virtual_keywords: &VirtualKeywords) -> Resolution {
    let kind = target_kind(filter.kind);
    let found = match parse_identifier(&filter.form) {
        Some(Identifier::FormKey(key)) => store.resolve(kind, &key),
        Some(Identifier::FormId(id)) => store.records(kind).find(|r| r.key.id == id),
        Some(Identifier::Symbol { name, plugin }) => store
            .find_by_editor_id(kind, &name)
            .filter(|r| plugin.as_ref().is_none_or(|p| r.key.plugin.eq_ignore_ascii_case(p))),
        Some(Identifier::Plugin(_)) | None => None,
    };

    match found {
        Some(record) => Resolution::Record(record.clone()),
        None if filter.kind == TargetKind::Keyword && virtual_keywords.contains(&filter.form) => {
            Resolution::VirtualKeyword(filter.form.clone())
        }
        None => unresolved(&filter.form),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::FormKey;
    use crate::record::MemoryStore;
    use crate::{KeywordTable, parse_line};

    fn record(kind: RecordKind, plugin: &str, id: u32, editor_id: &str) -> RecordInfo {
        RecordInfo { kind, key: FormKey::new(plugin, id), editor_id: Some(editor_id.into()), name: None }
    }

    fn store() -> MemoryStore {
        [
            record(RecordKind::Npc, "Skyrim.esm", 0x13BBF, "WhiterunGuard"),
            record(RecordKind::Keyword, "Skyrim.esm", 0x13794, "ActorTypeNPC"),
            record(RecordKind::Faction, "Skyrim.esm", 0x2816E, "GuardFaction"),
            record(RecordKind::Race, "Skyrim.esm", 0x13746, "NordRace"),
            // Same editor id in two categories: faction wins by lookup order.
            record(RecordKind::Outfit, "Skyrim.esm", 0x50, "Shared"),
            record(RecordKind::Faction, "Skyrim.esm", 0x51, "Shared"),
            record(RecordKind::Outfit, "MyMod.esp", 0x800, "GuardOutfit"),
        ]
        .into_iter()
        .collect()
    }

    fn line(text: &str) -> DistributionFilter {
        parse_line(text, &KeywordTable::default()).unwrap()
    }

    #[test]
    fn string_parts_resolve_in_priority_order() {
        let filters = [line("Keyword = NewKeyword"), line("Outfit = GuardOutfit|WhiterunGuard,ActorTypeNPC,NewKeyword,Ghost")];
        let virtual_keywords = VirtualKeywords::from_filters(&filters);
        let resolved = resolve_filter(&filters[1], &store(), &virtual_keywords);

        assert!(matches!(&resolved.strings[0].resolution, Resolution::Record(r) if r.kind == RecordKind::Npc));
        assert!(matches!(&resolved.strings[1].resolution, Resolution::Record(r) if r.kind == RecordKind::Keyword));
        assert_eq!(resolved.strings[2].resolution, Resolution::VirtualKeyword("NewKeyword".into()));
        assert_eq!(resolved.strings[3].resolution, Resolution::Unresolved("Ghost".into()));
        assert!(matches!(&resolved.target, Resolution::Record(r) if r.key == FormKey::new("MyMod.esp", 0x800)));
        assert_eq!(resolved.residue(), vec!["Ghost"]);
    }

    #[test]
    fn form_parts_resolve_keys_names_and_plugins() {
        let filter = line("Outfit = 0x800~MyMod.esp|NONE|0x2816E~Skyrim.esm,Shared,NordRace~Skyrim.esm,Skyrim.esm,0x13746,Missing.esp");
        let resolved = resolve_filter(&filter, &store(), &VirtualKeywords::default());
        let kinds: Vec<_> = resolved
            .forms
            .iter()
            .map(|p| match &p.resolution {
                Resolution::Record(r) => format!("{:?}", r.kind),
                Resolution::Plugin(p) => format!("plugin:{p}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["Faction", "Faction", "Race", "plugin:Skyrim.esm", "Race", "plugin:Missing.esp"]
        );
    }

    #[test]
    fn unknown_references_survive_as_residue() {
        let filter = line("Outfit = 0x999~NotLoaded.esp|NONE|0x1~NotLoaded.esp");
        let resolved = resolve_filter(&filter, &store(), &VirtualKeywords::default());
        assert_eq!(resolved.residue(), vec!["0x999~NotLoaded.esp", "0x1~NotLoaded.esp"]);
        assert_eq!(filter.format(), "Outfit = 0x999~NotLoaded.esp|NONE|0x1~NotLoaded.esp");
    }

    #[test]
    fn keyword_targets_are_virtual() {
        let filter = line("Keyword = BrandNew|ActorTypeNPC");
        let virtual_keywords = VirtualKeywords::from_filters([&filter]);
        let resolved = resolve_filter(&filter, &store(), &virtual_keywords);
        assert_eq!(resolved.target, Resolution::VirtualKeyword("BrandNew".into()));
    }
}
