use crate::discovery::{DistributionFile, discover_files};
use crate::engine::{
    self, CancelFlag, CharacterOutfitAssignment, KeywordDistributionEntry, KeywordOrder, KeywordSimulation,
    ResolvedFilter, RunMetrics, VirtualKeywords,
};
use crate::error::{Error, Result};
use crate::grammar::KeywordTable;
use crate::record::{CharacterRecord, RecordStore};
use crate::TargetKind;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Analysis context: the loaded records and the population to preview.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a dyn RecordStore,
    pub characters: &'a [CharacterRecord],
}

impl<'a> Context<'a> {
    pub fn new(store: &'a dyn RecordStore, characters: &'a [CharacterRecord]) -> Self {
        Self { store, characters }
    }
}

/// Options that affect discovery and parsing.
#[derive(Debug, Clone)]
pub struct Options {
    /// File-name suffix of Form A rule files (case-insensitive).
    pub distr_suffix: String,
    /// Form B directory, relative to the data directory.
    pub skypatcher_dir: PathBuf,
    pub include_distr: bool,
    pub include_skypatcher: bool,
    /// Keywords accepted on the left of `=`.
    pub keywords: KeywordTable,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            distr_suffix: "_DISTR.ini".to_string(),
            skypatcher_dir: PathBuf::from("SKSE/Plugins/SkyPatcher/npc"),
            include_distr: true,
            include_skypatcher: true,
            keywords: KeywordTable::default(),
        }
    }
}

/// A parsed rule with its references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    pub path: PathBuf,
    pub line: usize,
    pub filter: ResolvedFilter,
}

/// Result from [`analyze`] and [`analyze_files`].
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Every rule file, sorted by path.
    pub files: Vec<DistributionFile>,
    /// Default-outfit assignments, one per matched character.
    pub outfits: Vec<CharacterOutfitAssignment>,
    pub sleep_outfits: Vec<CharacterOutfitAssignment>,
    pub keyword_order: KeywordOrder,
    /// Indexed like [`Context::characters`].
    pub simulation: KeywordSimulation,
    /// Every parsed rule in file order.
    pub resolved: Vec<ResolvedRule>,
    pub metrics: RunMetrics,
}

impl Analysis {
    /// Characters with more than one matching outfit rule.
    pub fn conflicts(&self) -> impl Iterator<Item = &CharacterOutfitAssignment> {
        self.outfits.iter().chain(self.sleep_outfits.iter()).filter(|a| a.conflict)
    }

    /// `(resolved, total)` over every rule's target and filter parts.
    pub fn reference_counts(&self) -> (usize, usize) {
        self.resolved.iter().flat_map(|r| r.filter.references()).fold((0, 0), |(resolved, total), reference| {
            (resolved + usize::from(reference.is_resolved()), total + 1)
        })
    }

    /// `(path, line, text)` of every reference that did not resolve.
    pub fn unresolved(&self) -> impl Iterator<Item = (&Path, usize, &str)> {
        self.resolved.iter().flat_map(|r| r.filter.residue().into_iter().map(move |text| (r.path.as_path(), r.line, text)))
    }
}

/// Discover and analyze every rule file under `data_dir`.
pub fn analyze(data_dir: &Path, context: &Context<'_>, options: &Options, cancel: &CancelFlag) -> Result<Analysis> {
    let start = Instant::now();
    let files = discover_files(data_dir, options)?;
    let discovery = start.elapsed();

    let mut analysis = analyze_files(files, context, cancel)?;
    analysis.metrics.discovery = discovery;
    analysis.metrics.total = start.elapsed();
    Ok(analysis)
}

/// Analyze already-parsed files.
///
/// # Example
/// ```
/// use distrule::{
///     CancelFlag, CharacterData, CharacterRecord, Context, DistributionFile, FormKey, Grammar, KeywordTable,
///     MemoryStore, analyze_files,
/// };
///
/// let file = DistributionFile::parse(
///     "Guards_DISTR.ini",
///     Grammar::Distr,
///     "Outfit = GuardOutfit|*Guard",
///     &KeywordTable::default(),
/// );
/// let store = MemoryStore::new();
/// let characters = vec![CharacterRecord::new(CharacterData::new(FormKey::new("Skyrim.esm", 0x13BBF), "WhiterunGuard"))];
///
/// let analysis = analyze_files(vec![file], &Context::new(&store, &characters), &CancelFlag::new()).unwrap();
/// assert_eq!(analysis.outfits[0].winner().unwrap().outfit, "GuardOutfit");
/// ```
pub fn analyze_files(files: Vec<DistributionFile>, context: &Context<'_>, cancel: &CancelFlag) -> Result<Analysis> {
    let start = Instant::now();
    let characters = context.characters;

    let rules: Vec<(&Path, usize, &crate::DistributionFilter)> =
        files.iter().flat_map(|f| f.filters().map(move |(line, filter)| (f.path.as_path(), line, filter))).collect();

    // --- Resolve ---
    let stage = Instant::now();
    let virtual_keywords = VirtualKeywords::from_filters(rules.iter().map(|(_, _, f)| *f));
    let resolved: Vec<ResolvedRule> = rules
        .par_iter()
        .map(|&(path, line, filter)| ResolvedRule {
            path: path.to_path_buf(),
            line,
            filter: engine::resolve_filter(filter, context.store, &virtual_keywords),
        })
        .collect();
    let resolve = stage.elapsed();
    check(cancel)?;

    // --- Outfits ---
    let stage = Instant::now();
    let outfits = engine::resolve_outfit_winners(&files, characters, TargetKind::Outfit);
    let sleep_outfits = engine::resolve_outfit_winners(&files, characters, TargetKind::SleepOutfit);
    let matching = stage.elapsed();
    check(cancel)?;

    // --- Keywords ---
    let stage = Instant::now();
    let entries = rules.iter().filter_map(|(_, _, f)| KeywordDistributionEntry::from_filter(f)).collect();
    let keyword_order = engine::order_keyword_rules(entries);
    let simulation = engine::simulate_keywords(characters, &keyword_order, cancel)?;
    let simulation_time = stage.elapsed();

    let metrics = RunMetrics {
        total: start.elapsed(),
        discovery: Default::default(),
        matching,
        resolve,
        simulation: simulation_time,
        files: files.len(),
        rules: rules.len(),
        invalid_lines: files.iter().map(|f| f.invalid_lines().count()).sum(),
        characters: characters.len(),
    };
    tracing::debug!(?metrics, "analysis complete");

    Ok(Analysis { files, outfits, sleep_outfits, keyword_order, simulation, resolved, metrics })
}

fn check(cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::FormKey;
    use crate::record::{CharacterData, MemoryStore, RecordInfo, RecordKind, Snapshot};
    use std::fs;
    use tempfile::TempDir;

    fn population() -> (MemoryStore, Vec<CharacterRecord>) {
        let store: MemoryStore = [RecordInfo {
            kind: RecordKind::Keyword,
            key: FormKey::new("Skyrim.esm", 0x13794),
            editor_id: Some("ActorTypeNPC".into()),
            name: None,
        }]
        .into_iter()
        .collect();

        let mut guard = CharacterData::new(FormKey::new("Skyrim.esm", 0x13BBF), "WhiterunGuard");
        guard.keywords = vec!["ActorTypeNPC".into()];
        let bandit = CharacterData::new(FormKey::new("Skyrim.esm", 0x1E7D4), "BanditMelee");
        (store, vec![guard.into(), bandit.into()])
    }

    #[test]
    fn end_to_end_over_a_data_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A_DISTR.ini"), "Outfit = AOutfit|ActorTypeNPC\nKeyword = K1|ActorTypeNPC\n").unwrap();
        fs::write(dir.path().join("Z_DISTR.ini"), "Outfit = ZOutfit|*Guard\nKeyword = K2|K1\nOutfit = X|NONE|Ghost~Missing.esp\n")
            .unwrap();

        let (store, characters) = population();
        let analysis =
            analyze(dir.path(), &Context::new(&store, &characters), &Options::default(), &CancelFlag::new()).unwrap();

        assert_eq!(analysis.metrics.files, 2);
        assert_eq!(analysis.metrics.rules, 5);
        assert_eq!(analysis.metrics.characters, 2);

        assert_eq!(analysis.outfits.len(), 1);
        assert_eq!(analysis.outfits[0].winner().unwrap().outfit, "ZOutfit");
        assert_eq!(analysis.conflicts().count(), 1);
        assert!(analysis.sleep_outfits.is_empty());

        let gained: Vec<&str> = analysis.simulation.acquired_by(0).iter().map(|a| a.keyword.as_str()).collect();
        assert_eq!(gained, vec!["K1", "K2"]);
        assert!(analysis.simulation.acquired_by(1).is_empty());

        let unresolved: Vec<&str> = analysis.unresolved().map(|(_, _, text)| text).collect();
        assert!(unresolved.contains(&"X"));
        assert!(unresolved.contains(&"Ghost~Missing.esp"));
        assert!(!unresolved.contains(&"K1"));
        assert!(!unresolved.contains(&"Guard"));
    }

    #[test]
    fn snapshot_characters_resolve_by_editor_id() {
        let snapshot = Snapshot::from_json(
            r#"{"characters": [{"key": "Skyrim.esm|0x13BBF", "editor_id": "WhiterunGuard"}]}"#,
        )
        .unwrap();
        let (store, characters) = snapshot.into_parts();
        let file = DistributionFile::parse(
            "Guards_DISTR.ini",
            crate::Grammar::Distr,
            "Outfit = X|WhiterunGuard",
            &KeywordTable::default(),
        );

        let analysis = analyze_files(vec![file], &Context::new(&store, &characters), &CancelFlag::new()).unwrap();

        assert_eq!(analysis.outfits.len(), 1);
        let unresolved: Vec<&str> = analysis.unresolved().map(|(_, _, text)| text).collect();
        assert_eq!(unresolved, vec!["X"]);
        assert_eq!(analysis.reference_counts(), (1, 2));
    }

    #[test]
    fn cancelled_runs_stop() {
        let (store, characters) = population();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = analyze_files(Vec::new(), &Context::new(&store, &characters), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn missing_data_directory() {
        let (store, characters) = population();
        let result = analyze(
            Path::new("/definitely/not/here"),
            &Context::new(&store, &characters),
            &Options::default(),
            &CancelFlag::new(),
        );
        assert!(matches!(result, Err(Error::NotADirectory(_))));
    }
}
