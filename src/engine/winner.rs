//! Winner-takes-last outfit resolution.
//!
//! Every outfit rule that matches a character is a contender. Contenders are
//! ranked by processing order:
//!
//! ```text
//! grammar (Distr < SkyPatcher) → file name (case-insensitive) → line number
//! ```
//!
//! The last contender whose chance gate passes is the winner. A gated-out rule
//! stays in the contender list with `passed_chance = false`, so a preview can
//! still show it.

use super::chance;
use super::matcher::matches;
use crate::discovery::DistributionFile;
use crate::grammar::FormKey;
use crate::record::CharacterRecord;
use crate::{DistributionFilter, TargetKind};
use rayon::prelude::*;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutfitContender {
    pub path: PathBuf,
    pub line: usize,
    /// Target outfit text as written.
    pub outfit: String,
    /// Position in processing order; higher overrides lower.
    pub order: usize,
    pub chance: u8,
    pub passed_chance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterOutfitAssignment {
    pub character: FormKey,
    pub editor_id: String,
    /// Sorted by `order`.
    pub contenders: Vec<OutfitContender>,
    /// Index into `contenders`.
    pub winner: Option<usize>,
    /// More than one rule matched.
    pub conflict: bool,
}

impl CharacterOutfitAssignment {
    pub fn winner(&self) -> Option<&OutfitContender> {
        self.winner.and_then(|idx| self.contenders.get(idx))
    }
}

/// Files in the order their rules are applied.
pub fn processing_order(files: &[DistributionFile]) -> Vec<&DistributionFile> {
    let mut ordered: Vec<&DistributionFile> = files.iter().collect();
    ordered.sort_by_cached_key(|f| (f.grammar, f.file_name().to_lowercase(), f.path.clone()));
    ordered
}

struct RankedRule<'a> {
    order: usize,
    path: &'a PathBuf,
    line: usize,
    filter: &'a DistributionFilter,
}

/// Contenders and winner for every character matched by at least one rule
/// of `kind`. Characters keep their input order.
pub fn resolve_outfit_winners(
    files: &[DistributionFile],
    characters: &[CharacterRecord],
    kind: TargetKind,
) -> Vec<CharacterOutfitAssignment> {
    let rules: Vec<RankedRule<'_>> = processing_order(files)
        .into_iter()
        .flat_map(|file| file.filters().map(move |(line, filter)| (file, line, filter)))
        .filter(|(_, _, filter)| filter.kind == kind)
        .enumerate()
        .map(|(order, (file, line, filter))| RankedRule { order, path: &file.path, line, filter })
        .collect();

    tracing::debug!(kind = %kind, rules = rules.len(), "resolving outfit winners");

    characters
        .par_iter()
        .filter_map(|character| {
            let contenders: Vec<OutfitContender> = rules
                .iter()
                .filter(|rule| matches(character, rule.filter))
                .map(|rule| OutfitContender {
                    path: rule.path.clone(),
                    line: rule.line,
                    outfit: rule.filter.form.clone(),
                    order: rule.order,
                    chance: rule.filter.chance,
                    passed_chance: chance::passes(character, rule.filter),
                })
                .collect();

            if contenders.is_empty() {
                return None;
            }
            let winner = contenders.iter().rposition(|c| c.passed_chance);
            Some(CharacterOutfitAssignment {
                character: character.key().clone(),
                editor_id: character.editor_id().to_string(),
                conflict: contenders.len() > 1,
                contenders,
                winner,
            })
        })
        .collect()
}
