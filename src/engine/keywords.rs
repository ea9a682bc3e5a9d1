//! Keyword dependency ordering and simulation.
//!
//! Keyword rules can filter on keywords that other keyword rules hand out.
//! Applying them in file order would miss every chain whose producer appears
//! after its consumer, so rules are ordered by a dependency graph first:
//!
//! ```text
//! Keyword = K1|ActorTypeNPC      K1 ──▶ K2 ──▶ K3
//! Keyword = K3|K2
//! Keyword = K2|K1
//! ```
//!
//! Nodes are emitted keywords (an arena of indices), and an edge `K → K'`
//! exists when a rule emitting `K'` references `K` in its string section.
//! Kahn's algorithm yields the order; nodes it never reaches sit on or behind
//! a cycle and are reported instead of applied.
//!
//! The simulation then walks the ordered rules one at a time. A rule is
//! applied to the whole population (in parallel) before the next one starts,
//! so every producer is complete before its consumers are evaluated.

use super::chance;
use super::matcher::matches_with_keywords;
use crate::error::{Error, Result};
use crate::record::CharacterRecord;
use crate::{DistributionFilter, TargetKind};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A keyword-emitting rule with its outgoing keyword and the keywords it
/// filters on (lower-cased, exact references only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDistributionEntry {
    pub filter: DistributionFilter,
    pub keyword: String,
    pub references: BTreeSet<String>,
}

impl KeywordDistributionEntry {
    /// `None` unless `filter` is a keyword rule.
    pub fn from_filter(filter: &DistributionFilter) -> Option<Self> {
        if filter.kind != TargetKind::Keyword {
            return None;
        }
        let references = filter
            .strings
            .parts()
            .filter(|part| !part.is_wildcard())
            .map(|part| part.value.to_lowercase())
            .collect();
        Some(KeywordDistributionEntry { keyword: filter.form.trim().to_string(), references, filter: filter.clone() })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordOrder {
    /// Rules in dependency order.
    pub ordered: Vec<KeywordDistributionEntry>,
    /// Keywords left out because they sit on or behind a cycle.
    pub cyclic: Vec<String>,
}

/// Kahn's algorithm over `node_count` nodes. Returns `(sorted, unreached)`;
/// ties are broken by node index so the result is deterministic.
pub fn topological_sort(node_count: usize, edges: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    let mut in_degree = vec![0usize; node_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(from, to) in edges {
        if from == to || from >= node_count || to >= node_count {
            continue;
        }
        outgoing[from].push(to);
        in_degree[to] += 1;
    }

    let mut queue: VecDeque<usize> = (0..node_count).filter(|&n| in_degree[n] == 0).collect();
    let mut sorted = Vec::with_capacity(node_count);
    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &next in &outgoing[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let unreached = (0..node_count).filter(|&n| in_degree[n] > 0).collect();
    (sorted, unreached)
}

/// Order keyword rules so producers come before consumers.
pub fn order_keyword_rules(entries: Vec<KeywordDistributionEntry>) -> KeywordOrder {
    // Arena: one node per distinct emitted keyword, first spelling kept.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut names: Vec<String> = Vec::new();
    for entry in &entries {
        let key = entry.keyword.to_lowercase();
        if !index.contains_key(&key) {
            index.insert(key, names.len());
            names.push(entry.keyword.clone());
        }
    }

    let mut edges = Vec::new();
    for entry in &entries {
        let to = index[&entry.keyword.to_lowercase()];
        edges.extend(entry.references.iter().filter_map(|r| index.get(r)).map(|&from| (from, to)));
    }

    let (sorted, unreached) = topological_sort(names.len(), &edges);
    let mut rank = vec![usize::MAX; names.len()];
    for (pos, &node) in sorted.iter().enumerate() {
        rank[node] = pos;
    }

    let mut ordered: Vec<(usize, KeywordDistributionEntry)> = entries
        .into_iter()
        .map(|entry| (rank[index[&entry.keyword.to_lowercase()]], entry))
        .filter(|(r, _)| *r != usize::MAX)
        .collect();
    // Stable: rules emitting the same keyword keep their input order.
    ordered.sort_by_key(|(r, _)| *r);

    let cyclic: Vec<String> = unreached.into_iter().map(|n| names[n].clone()).collect();
    if !cyclic.is_empty() {
        tracing::warn!(keywords = ?cyclic, "cyclic keyword dependencies excluded");
    }

    KeywordOrder { ordered: ordered.into_iter().map(|(_, e)| e).collect(), cyclic }
}

// --- Simulation -----------------------------------------------------------------

/// Shared cancellation flag, checked between rules.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordAcquisition {
    pub keyword: String,
    /// Index into [`KeywordOrder::ordered`] of the rule that handed it out.
    pub step: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSimulation {
    /// Per character (input order), keywords gained in acquisition order.
    pub acquired: Vec<Vec<KeywordAcquisition>>,
    pub cyclic: Vec<String>,
}

impl KeywordSimulation {
    pub fn acquired_by(&self, character: usize) -> &[KeywordAcquisition] {
        self.acquired.get(character).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.acquired.iter().map(Vec::len).sum()
    }
}

pub fn simulate_keywords(
    characters: &[CharacterRecord],
    order: &KeywordOrder,
    cancel: &CancelFlag,
) -> Result<KeywordSimulation> {
    let mut working: Vec<HashSet<String>> = characters.iter().map(|c| c.keywords().iter().cloned().collect()).collect();
    let mut acquired: Vec<Vec<KeywordAcquisition>> = vec![Vec::new(); characters.len()];

    for (step, entry) in order.ordered.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let keyword = entry.keyword.to_lowercase();

        characters.par_iter().zip(working.par_iter_mut()).zip(acquired.par_iter_mut()).for_each(
            |((character, set), gained)| {
                if set.contains(&keyword) {
                    return;
                }
                if matches_with_keywords(character, &entry.filter, set) && chance::passes(character, &entry.filter) {
                    set.insert(keyword.clone());
                    gained.push(KeywordAcquisition { keyword: entry.keyword.clone(), step });
                }
            },
        );
    }

    Ok(KeywordSimulation { acquired, cyclic: order.cyclic.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::FormKey;
    use crate::record::CharacterData;
    use crate::{KeywordTable, parse_line};

    fn entries(lines: &[&str]) -> Vec<KeywordDistributionEntry> {
        let table = KeywordTable::default();
        lines
            .iter()
            .map(|l| parse_line(l, &table).unwrap())
            .filter_map(|f| KeywordDistributionEntry::from_filter(&f))
            .collect()
    }

    fn npc(editor_id: &str, keywords: &[&str]) -> CharacterRecord {
        let mut data = CharacterData::new(FormKey::new("Skyrim.esm", 0x10), editor_id);
        data.keywords = keywords.iter().map(|k| k.to_string()).collect();
        CharacterRecord::new(data)
    }

    #[test]
    fn kahn_sorts_and_reports_cycles() {
        let cases: Vec<(usize, Vec<(usize, usize)>, Vec<usize>, Vec<usize>)> = vec![
            (3, vec![], vec![0, 1, 2], vec![]),
            (3, vec![(2, 1), (1, 0)], vec![2, 1, 0], vec![]),
            (3, vec![(0, 1), (1, 0)], vec![2], vec![0, 1]),
            (2, vec![(0, 0)], vec![0, 1], vec![]),
            (4, vec![(0, 1), (1, 0), (1, 2)], vec![3], vec![0, 1, 2]),
        ];

        for (nodes, edges, sorted, cyclic) in cases {
            assert_eq!(topological_sort(nodes, &edges), (sorted, cyclic), "edges {edges:?}");
        }
    }

    #[test]
    fn chain_is_acquired_in_dependency_order() {
        let order = order_keyword_rules(entries(&[
            "Keyword = K1|ActorTypeNPC",
            "Keyword = K3|K2",
            "Keyword = K2|K1",
            "Outfit = NotAKeyword|K3",
        ]));
        let emitted: Vec<&str> = order.ordered.iter().map(|e| e.keyword.as_str()).collect();
        assert_eq!(emitted, vec!["K1", "K2", "K3"]);
        assert!(order.cyclic.is_empty());

        let characters = vec![npc("Guard", &["ActorTypeNPC"]), npc("Wolf", &["ActorTypeAnimal"])];
        let simulation = simulate_keywords(&characters, &order, &CancelFlag::new()).unwrap();

        let gained: Vec<(&str, usize)> =
            simulation.acquired_by(0).iter().map(|a| (a.keyword.as_str(), a.step)).collect();
        assert_eq!(gained, vec![("K1", 0), ("K2", 1), ("K3", 2)]);
        assert!(simulation.acquired_by(1).is_empty());
        assert_eq!(simulation.total(), 3);
    }

    #[test]
    fn cycles_are_excluded() {
        let order = order_keyword_rules(entries(&[
            "Keyword = K1|K2",
            "Keyword = K2|K1",
            "Keyword = K3|ActorTypeNPC",
            "Keyword = Self|Self,ActorTypeNPC",
        ]));
        assert_eq!(order.cyclic, vec!["K1", "K2"]);
        let emitted: Vec<&str> = order.ordered.iter().map(|e| e.keyword.as_str()).collect();
        assert_eq!(emitted, vec!["K3", "Self"]);

        let simulation = simulate_keywords(&[npc("Guard", &["ActorTypeNPC"])], &order, &CancelFlag::new()).unwrap();
        assert_eq!(simulation.acquired_by(0).len(), 2);
        assert_eq!(simulation.cyclic, vec!["K1", "K2"]);
    }

    #[test]
    fn stored_keywords_are_not_reacquired() {
        let order = order_keyword_rules(entries(&["Keyword = ActorTypeNPC"]));
        let simulation = simulate_keywords(&[npc("Guard", &["ActorTypeNPC"])], &order, &CancelFlag::new()).unwrap();
        assert!(simulation.acquired_by(0).is_empty());
    }

    #[test]
    fn cancellation_between_rules() {
        let order = order_keyword_rules(entries(&["Keyword = K1"]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(simulate_keywords(&[npc("Guard", &[])], &order, &cancel), Err(Error::Cancelled)));
    }
}
