#[macro_use]
mod macros;
mod api;
mod discovery;
mod engine;
mod error;
mod grammar;
mod record;

pub use api::{Analysis, Context, Options, ResolvedRule, analyze, analyze_files};
pub use discovery::{DistributionFile, DistributionLine, LineKind, discover_files};
pub use engine::{
    CancelFlag, CharacterOutfitAssignment, KeywordAcquisition, KeywordDistributionEntry, KeywordOrder,
    KeywordSimulation, OutfitContender, Resolution, ResolvedFilter, ResolvedPart, RunMetrics, VirtualKeywords,
    chance_gate, matches, matches_with_keywords, order_keyword_rules, processing_order, resolve_filter,
    resolve_outfit_winners, simulate_keywords, topological_sort,
};
pub use error::{Error, LineError, Result};
pub use grammar::{
    FormKey, Identifier, KeywordTable, format_form_id, is_plugin_filename, parse_clause_line, parse_form_id,
    parse_identifier, parse_line, parse_section, strip_comment,
};
pub use record::{
    CharacterData, CharacterRecord, FactionMembership, MemoryStore, RecordInfo, RecordKind, RecordRef, RecordStore,
    Snapshot, TraitFlags,
};

use std::fmt;

// --- Filter model ------------------------------------------------------------

/// Surface grammar a rule was written in.
///
/// The derived ordering is the processing order: every `Distr` file is
/// processed before any `SkyPatcher` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grammar {
    /// `Keyword = form|strings|forms|level|traits|count|chance`
    Distr,
    /// `filterByNpcs=...:outfitDefault=...`
    SkyPatcher,
}

/// What a rule hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    Spell,
    Perk,
    Item,
    Shout,
    LevSpell,
    Package,
    Outfit,
    SleepOutfit,
    Keyword,
    Faction,
    DeathItem,
    Skin,
}

impl TargetKind {
    /// Canonical keyword spelling used on the left of `=`.
    pub fn keyword(self) -> &'static str {
        match self {
            TargetKind::Spell => "Spell",
            TargetKind::Perk => "Perk",
            TargetKind::Item => "Item",
            TargetKind::Shout => "Shout",
            TargetKind::LevSpell => "LevSpell",
            TargetKind::Package => "Package",
            TargetKind::Outfit => "Outfit",
            TargetKind::SleepOutfit => "SleepOutfit",
            TargetKind::Keyword => "Keyword",
            TargetKind::Faction => "Faction",
            TargetKind::DeathItem => "DeathItem",
            TargetKind::Skin => "Skin",
        }
    }

    pub fn is_outfit(self) -> bool {
        matches!(self, TargetKind::Outfit | TargetKind::SleepOutfit)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Position of the `*` marker on a filter part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wildcard {
    #[default]
    None,
    Prefix,
    Suffix,
    Both,
}

/// Atomic predicate: one value, optionally negated and/or wildcarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPart {
    pub value: String,
    pub negated: bool,
    pub wildcard: Wildcard,
}

impl FilterPart {
    /// Parse a single token such as `-*Guard`. Returns `None` when nothing is
    /// left after stripping the markers.
    pub fn parse(token: &str) -> Option<Self> {
        let mut text = token.trim();
        let negated = text.starts_with('-');
        if negated {
            text = text[1..].trim_start();
        }

        let prefix = text.starts_with('*');
        if prefix {
            text = &text[1..];
        }
        let suffix = !text.is_empty() && text.ends_with('*');
        if suffix {
            text = &text[..text.len() - 1];
        }

        let value = text.trim();
        if value.is_empty() {
            return None;
        }

        let wildcard = match (prefix, suffix) {
            (true, true) => Wildcard::Both,
            (true, false) => Wildcard::Prefix,
            (false, true) => Wildcard::Suffix,
            (false, false) => Wildcard::None,
        };
        Some(FilterPart { value: value.to_string(), negated, wildcard })
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard != Wildcard::None
    }
}

impl fmt::Display for FilterPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("-")?;
        }
        if matches!(self.wildcard, Wildcard::Prefix | Wildcard::Both) {
            f.write_str("*")?;
        }
        f.write_str(&self.value)?;
        if matches!(self.wildcard, Wildcard::Suffix | Wildcard::Both) {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// AND-combined parts.
///
/// `attached` holds the negated parts that were written as separate comma
/// segments after this group (`A+B,-C,-D`). They AND with `parts` exactly like
/// `A+B+-C+-D` would; they are kept apart only so formatting reproduces the
/// authored text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpression {
    pub parts: Vec<FilterPart>,
    pub attached: Vec<FilterPart>,
}

impl FilterExpression {
    /// Every condition of the expression, in authored order.
    pub fn conditions(&self) -> impl Iterator<Item = &FilterPart> {
        self.parts.iter().chain(self.attached.iter())
    }
}

/// OR-combined expressions plus a line-wide exclusion list.
///
/// `exclusions` are negated parts that apply as AND-NOT to every expression
/// of the section. An empty section matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSection {
    pub expressions: Vec<FilterExpression>,
    pub exclusions: Vec<FilterPart>,
}

impl FilterSection {
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty() && self.exclusions.is_empty()
    }

    /// Every part in the section: exclusions first, then each expression.
    pub fn parts(&self) -> impl Iterator<Item = &FilterPart> {
        self.exclusions.iter().chain(self.expressions.iter().flat_map(|e| e.conditions()))
    }
}

/// Nullable trait constraints; `None` leaves the trait unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraitFilters {
    pub female: Option<bool>,
    pub unique: Option<bool>,
    pub summonable: Option<bool>,
    pub child: Option<bool>,
    pub leveled: Option<bool>,
    pub teammate: Option<bool>,
    pub dead: Option<bool>,
}

impl TraitFilters {
    pub fn is_empty(&self) -> bool {
        *self == TraitFilters::default()
    }
}

/// One comma-separated entry of the level section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEntry {
    /// `5`
    Min(u16),
    /// `5/20`
    Range(u16, u16),
    /// `14(50/75)`; tokenized only, never evaluated.
    Skill { skill: u16, min: u16, max: Option<u16> },
}

/// One parsed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionFilter {
    pub grammar: Grammar,
    pub kind: TargetKind,
    /// Keyword (or clause key) as written.
    pub keyword: String,
    /// Target form identifier text.
    pub form: String,
    pub strings: FilterSection,
    pub forms: FilterSection,
    pub level: Option<String>,
    pub levels: Vec<LevelEntry>,
    pub traits: TraitFilters,
    pub count: Option<String>,
    /// Always within `0..=100`.
    pub chance: u8,
    pub raw: String,
}

pub(crate) const DEFAULT_CHANCE: u8 = 100;
