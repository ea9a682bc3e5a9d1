//! Read-only record store and indexed character snapshots.
//!
//! The binary plugin codec is an external collaborator: by the time rules are
//! evaluated every record has already been loaded. This module only models
//! what the engine needs from it:
//!
//! - [`RecordStore`]: "resolve category T by key", "find category T by editor
//!   id" and "enumerate the winning overrides of category T".
//! - [`CharacterRecord`]: a flattened character with its references resolved
//!   and a derived match-key set for fast string filtering.
//!
//! [`MemoryStore`] and [`Snapshot`] provide a JSON-backed implementation used
//! by the CLI and the tests.

use crate::error::{Error, Result};
use crate::grammar::FormKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Record categories the engine resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Npc,
    Keyword,
    Faction,
    Race,
    Class,
    CombatStyle,
    Outfit,
    Perk,
    VoiceType,
    Location,
    FormList,
    Spell,
    Item,
    Package,
    Shout,
}

/// One record as seen through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub kind: RecordKind,
    pub key: FormKey,
    #[serde(default)]
    pub editor_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Read-only record lookups.
pub trait RecordStore: Sync {
    fn resolve(&self, kind: RecordKind, key: &FormKey) -> Option<&RecordInfo>;

    fn find_by_editor_id(&self, kind: RecordKind, editor_id: &str) -> Option<&RecordInfo>;

    /// Winning overrides of `kind`, in load order.
    fn records(&self, kind: RecordKind) -> Box<dyn Iterator<Item = &RecordInfo> + '_>;
}

/// In-memory store. Inserting an existing `(kind, key)` replaces the earlier
/// record, so the last insert is the winning override.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<RecordInfo>,
    by_key: HashMap<(RecordKind, FormKey), usize>,
    by_editor_id: HashMap<(RecordKind, String), usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: RecordInfo) {
        let slot = (record.kind, record.key.clone());
        let idx = match self.by_key.get(&slot) {
            Some(&idx) => {
                if let Some(old) = &self.records[idx].editor_id {
                    let index_key = (record.kind, old.to_lowercase());
                    // Another record may have taken the editor id since.
                    if self.by_editor_id.get(&index_key) == Some(&idx) {
                        self.by_editor_id.remove(&index_key);
                    }
                }
                self.records[idx] = record;
                idx
            }
            None => {
                self.records.push(record);
                self.by_key.insert(slot, self.records.len() - 1);
                self.records.len() - 1
            }
        };

        let record = &self.records[idx];
        if let Some(editor_id) = &record.editor_id {
            self.by_editor_id.insert((record.kind, editor_id.to_lowercase()), idx);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<RecordInfo> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = RecordInfo>>(iter: I) -> Self {
        let mut store = MemoryStore::new();
        for record in iter {
            store.insert(record);
        }
        store
    }
}

impl RecordStore for MemoryStore {
    fn resolve(&self, kind: RecordKind, key: &FormKey) -> Option<&RecordInfo> {
        self.by_key.get(&(kind, key.clone())).map(|&idx| &self.records[idx])
    }

    fn find_by_editor_id(&self, kind: RecordKind, editor_id: &str) -> Option<&RecordInfo> {
        self.by_editor_id.get(&(kind, editor_id.to_lowercase())).map(|&idx| &self.records[idx])
    }

    fn records(&self, kind: RecordKind) -> Box<dyn Iterator<Item = &RecordInfo> + '_> {
        Box::new(self.records.iter().filter(move |r| r.kind == kind))
    }
}

// --- Characters -----------------------------------------------------------------

bitflags::bitflags! {
    /// Boolean character traits tested by the trait section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TraitFlags: u8 {
        const FEMALE     = 1 << 0;
        const UNIQUE     = 1 << 1;
        const SUMMONABLE = 1 << 2;
        const CHILD      = 1 << 3;
        const LEVELED    = 1 << 4;
        const TEAMMATE   = 1 << 5;
        const DEAD       = 1 << 6;
    }
}

/// Resolved reference: key plus editor id when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub key: FormKey,
    #[serde(default)]
    pub editor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionMembership {
    pub key: FormKey,
    #[serde(default)]
    pub editor_id: Option<String>,
    #[serde(default)]
    pub rank: i8,
}

/// Raw character data as delivered by the record loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub key: FormKey,
    pub editor_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Plugin that provides the winning override; defaults to the key's plugin.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub race: Option<RecordRef>,
    #[serde(default)]
    pub class: Option<RecordRef>,
    #[serde(default)]
    pub combat_style: Option<RecordRef>,
    #[serde(default)]
    pub voice: Option<RecordRef>,
    #[serde(default)]
    pub template: Option<RecordRef>,
    #[serde(default)]
    pub default_outfit: Option<RecordRef>,
    #[serde(default)]
    pub factions: Vec<FactionMembership>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Keywords inherited from the race.
    #[serde(default)]
    pub race_keywords: Vec<String>,
    #[serde(default)]
    pub traits: TraitFlags,
    #[serde(default)]
    pub level: u16,
    #[serde(default)]
    pub skills: Vec<u8>,
}

impl CharacterData {
    pub fn new(key: FormKey, editor_id: impl Into<String>) -> Self {
        CharacterData {
            key,
            editor_id: editor_id.into(),
            name: None,
            source: None,
            race: None,
            class: None,
            combat_style: None,
            voice: None,
            template: None,
            default_outfit: None,
            factions: Vec::new(),
            keywords: Vec::new(),
            race_keywords: Vec::new(),
            traits: TraitFlags::empty(),
            level: 1,
            skills: Vec::new(),
        }
    }
}

/// Indexed, immutable character snapshot.
///
/// The keyword set (own ∪ race) and the match-key set are derived once in
/// [`CharacterRecord::new`]; there is no way to mutate them afterwards.
#[derive(Debug, Clone)]
pub struct CharacterRecord {
    data: CharacterData,
    keywords: BTreeSet<String>,
    match_keys: HashSet<String>,
}

impl CharacterRecord {
    pub fn new(data: CharacterData) -> Self {
        let keywords: BTreeSet<String> =
            data.keywords.iter().chain(data.race_keywords.iter()).map(|k| k.trim().to_lowercase()).collect();

        let mut match_keys: HashSet<String> = keywords.iter().cloned().collect();
        match_keys.insert(data.editor_id.to_lowercase());
        if let Some(name) = &data.name {
            match_keys.insert(name.to_lowercase());
        }
        if let Some(template) = data.template.as_ref().and_then(|t| t.editor_id.as_ref()) {
            match_keys.insert(template.to_lowercase());
        }

        CharacterRecord { data, keywords, match_keys }
    }

    pub fn data(&self) -> &CharacterData {
        &self.data
    }

    pub fn key(&self) -> &FormKey {
        &self.data.key
    }

    pub fn editor_id(&self) -> &str {
        &self.data.editor_id
    }

    pub fn name(&self) -> Option<&str> {
        self.data.name.as_deref()
    }

    pub fn source_plugin(&self) -> &str {
        self.data.source.as_deref().unwrap_or(&self.data.key.plugin)
    }

    /// Lower-cased keywords, own and race-inherited.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn match_keys(&self) -> &HashSet<String> {
        &self.match_keys
    }

    pub fn traits(&self) -> TraitFlags {
        self.data.traits
    }

    pub fn level(&self) -> u16 {
        self.data.level
    }
}

impl From<CharacterData> for CharacterRecord {
    fn from(data: CharacterData) -> Self {
        CharacterRecord::new(data)
    }
}

// --- Snapshot -------------------------------------------------------------------

/// JSON snapshot of everything the loader produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub records: Vec<RecordInfo>,
    #[serde(default)]
    pub characters: Vec<CharacterData>,
}

impl Snapshot {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    /// Split into a store and indexed characters.
    ///
    /// Every character is also registered as an `Npc` record unless the
    /// snapshot already lists one under the same key, so string filters can
    /// name characters.
    pub fn into_parts(self) -> (MemoryStore, Vec<CharacterRecord>) {
        let mut store: MemoryStore = self.records.into_iter().collect();
        for data in &self.characters {
            if store.resolve(RecordKind::Npc, &data.key).is_none() {
                store.insert(RecordInfo {
                    kind: RecordKind::Npc,
                    key: data.key.clone(),
                    editor_id: Some(data.editor_id.clone()),
                    name: data.name.clone(),
                });
            }
        }
        let characters = self.characters.into_iter().map(CharacterRecord::new).collect();
        (store, characters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: RecordKind, plugin: &str, id: u32, editor_id: &str) -> RecordInfo {
        RecordInfo { kind, key: FormKey::new(plugin, id), editor_id: Some(editor_id.into()), name: None }
    }

    #[test]
    fn later_insert_is_winning_override() {
        let mut store = MemoryStore::new();
        store.insert(record(RecordKind::Outfit, "Skyrim.esm", 0x1, "GuardOutfit"));
        store.insert(record(RecordKind::Outfit, "Skyrim.esm", 0x1, "GuardOutfitRenamed"));

        assert_eq!(store.len(), 1);
        assert!(store.find_by_editor_id(RecordKind::Outfit, "GuardOutfit").is_none());
        let found = store.find_by_editor_id(RecordKind::Outfit, "guardoutfitrenamed").unwrap();
        assert_eq!(found.key, FormKey::new("SKYRIM.ESM", 0x1));
        assert_eq!(store.records(RecordKind::Outfit).count(), 1);
        assert_eq!(store.records(RecordKind::Race).count(), 0);
    }

    #[test]
    fn replacing_a_record_keeps_editor_id_taken_by_another() {
        let mut store = MemoryStore::new();
        store.insert(record(RecordKind::Outfit, "Skyrim.esm", 0x1, "Shared"));
        store.insert(record(RecordKind::Outfit, "Skyrim.esm", 0x2, "Shared"));
        store.insert(record(RecordKind::Outfit, "Skyrim.esm", 0x1, "Other"));

        let shared = store.find_by_editor_id(RecordKind::Outfit, "Shared").unwrap();
        assert_eq!(shared.key, FormKey::new("Skyrim.esm", 0x2));
        let other = store.find_by_editor_id(RecordKind::Outfit, "Other").unwrap();
        assert_eq!(other.key, FormKey::new("Skyrim.esm", 0x1));
    }

    #[test]
    fn match_keys_are_derived() {
        let mut data = CharacterData::new(FormKey::new("Skyrim.esm", 0x13BBF), "WhiterunGuard");
        data.name = Some("Whiterun Guard".into());
        data.keywords = vec!["ActorTypeNPC".into()];
        data.race_keywords = vec!["ActorTypeNPC".into(), "RaceNord".into()];
        data.template = Some(RecordRef { key: FormKey::new("Skyrim.esm", 0x1), editor_id: Some("GuardTemplate".into()) });

        let character = CharacterRecord::new(data);
        assert_eq!(character.keywords().len(), 2);
        for key in ["whiterunguard", "whiterun guard", "guardtemplate", "actortypenpc", "racenord"] {
            assert!(character.match_keys().contains(key), "missing {key}");
        }
        assert_eq!(character.source_plugin(), "Skyrim.esm");
    }

    #[test]
    fn snapshot_from_json() {
        let snapshot = Snapshot::from_json(
            r#"{
                "records": [
                    {"kind": "outfit", "key": "0x800~MyMod.esp", "editor_id": "GuardOutfit"}
                ],
                "characters": [
                    {"key": "Skyrim.esm|0x13BBF", "editor_id": "WhiterunGuard", "traits": "FEMALE | UNIQUE", "level": 12}
                ]
            }"#,
        )
        .unwrap();

        let (store, characters) = snapshot.into_parts();
        assert!(store.resolve(RecordKind::Outfit, &FormKey::new("MyMod.esp", 0x800)).is_some());
        assert_eq!(characters[0].traits(), TraitFlags::FEMALE | TraitFlags::UNIQUE);
        assert_eq!(characters[0].level(), 12);

        let npc = store.find_by_editor_id(RecordKind::Npc, "WhiterunGuard").unwrap();
        assert_eq!(npc.key, FormKey::new("Skyrim.esm", 0x13BBF));
    }

    #[test]
    fn snapshot_npc_records_win_over_characters() {
        let snapshot = Snapshot::from_json(
            r#"{
                "records": [
                    {"kind": "npc", "key": "Skyrim.esm|0x13BBF", "editor_id": "GuardFromRecords", "name": "Guard"}
                ],
                "characters": [
                    {"key": "Skyrim.esm|0x13BBF", "editor_id": "WhiterunGuard"},
                    {"key": "Skyrim.esm|0x1A694", "editor_id": "Lydia", "name": "Lydia"}
                ]
            }"#,
        )
        .unwrap();

        let (store, _) = snapshot.into_parts();
        assert_eq!(store.records(RecordKind::Npc).count(), 2);
        assert!(store.find_by_editor_id(RecordKind::Npc, "GuardFromRecords").is_some());
        assert!(store.find_by_editor_id(RecordKind::Npc, "WhiterunGuard").is_none());
        let lydia = store.find_by_editor_id(RecordKind::Npc, "lydia").unwrap();
        assert_eq!(lydia.name.as_deref(), Some("Lydia"));
    }

    #[test]
    fn bad_snapshot_is_an_error() {
        assert!(matches!(Snapshot::from_json("{\"characters\": [{\"key\": \"nope\"}]}"), Err(Error::Json(_))));
    }
}
