//! `key=value:key=value` clause lines.
//!
//! ```text
//! filterByFactions=Skyrim.esm|0x2816E:filterByGender=female:outfitDefault=MyMod.esp|0x800
//! ```
//!
//! Values inside a clause are comma-separated alternatives. Different filter
//! clauses must all hold, so the clauses feeding one section are expanded
//! into the cross product of their alternatives:
//!
//! ```text
//! filterByNpcs=A,B:filterByFactions=F   =>  forms = (A ∧ F) ∨ (B ∧ F)
//! ```
//!
//! A line may name both a default and a sleep outfit; it then yields one
//! filter per target.

use super::line::{parse_chance, strip_comment};
use crate::error::LineError;
use crate::{DEFAULT_CHANCE, DistributionFilter, FilterExpression, FilterPart, FilterSection, Grammar, TargetKind, TraitFilters};

#[derive(Default)]
struct Clauses {
    string_groups: Vec<Vec<FilterPart>>,
    form_groups: Vec<Vec<FilterPart>>,
    string_exclusions: Vec<FilterPart>,
    form_exclusions: Vec<FilterPart>,
    traits: TraitFilters,
    chance: Option<u8>,
    targets: Vec<(TargetKind, String, String)>,
}

fn alternatives(value: &str) -> Vec<FilterPart> {
    value.split(',').filter_map(FilterPart::parse).collect()
}

fn excluded(value: &str) -> impl Iterator<Item = FilterPart> + '_ {
    alternatives(value).into_iter().map(|part| FilterPart { negated: true, ..part })
}

/// Cross product of OR-groups into AND-expressions.
fn expand(groups: &[Vec<FilterPart>]) -> Vec<FilterExpression> {
    let groups: Vec<&Vec<FilterPart>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.is_empty() {
        return Vec::new();
    }

    let mut combos: Vec<Vec<FilterPart>> = vec![Vec::new()];
    for group in groups {
        combos = combos
            .iter()
            .flat_map(|prefix| {
                group.iter().map(move |alt| {
                    let mut next = prefix.clone();
                    next.push(alt.clone());
                    next
                })
            })
            .collect();
    }

    combos.into_iter().map(|parts| FilterExpression { parts, attached: Vec::new() }).collect()
}

/// Parse one clause line into a filter per outfit target.
pub fn parse_clause_line(line: &str) -> Result<Vec<DistributionFilter>, LineError> {
    let text = strip_comment(line).trim();
    if text.is_empty() {
        return Err(LineError::Empty);
    }

    let mut clauses = Clauses::default();

    for raw in text.split(':') {
        let clause = raw.trim();
        if clause.is_empty() {
            continue;
        }
        let (key, value) = clause.split_once('=').ok_or_else(|| LineError::MalformedClause(clause.to_string()))?;
        let (key, value) = (key.trim(), value.trim());

        match key.to_ascii_lowercase().as_str() {
            "filterbynpcs" | "filterbyfactions" | "filterbyraces" | "filterbyoutfits" => {
                clauses.form_groups.push(alternatives(value));
            }
            "filterbynpcsexcluded"
            | "filterbyfactionsexcluded"
            | "filterbyracesexcluded"
            | "filterbyoutfitsexcluded" => {
                clauses.form_exclusions.extend(excluded(value));
            }
            "filterbykeywords" => clauses.string_groups.push(alternatives(value)),
            "filterbykeywordsexcluded" => clauses.string_exclusions.extend(excluded(value)),
            "filterbygender" => {
                clauses.traits.female = match value.to_ascii_lowercase().as_str() {
                    "female" => Some(true),
                    "male" => Some(false),
                    _ => return Err(LineError::InvalidTrait(value.to_string())),
                };
            }
            "outfitdefault" => clauses.targets.push((TargetKind::Outfit, key.to_string(), value.to_string())),
            "outfitsleep" => clauses.targets.push((TargetKind::SleepOutfit, key.to_string(), value.to_string())),
            "chance" => clauses.chance = Some(parse_chance(value)?),
            other => tracing::trace!(key = other, "ignoring unknown clause"),
        }
    }

    if clauses.targets.is_empty() {
        return Err(LineError::MissingTarget);
    }

    let strings = FilterSection { expressions: expand(&clauses.string_groups), exclusions: clauses.string_exclusions };
    let forms = FilterSection { expressions: expand(&clauses.form_groups), exclusions: clauses.form_exclusions };
    let chance = clauses.chance.unwrap_or(DEFAULT_CHANCE);

    Ok(clauses
        .targets
        .into_iter()
        .map(|(kind, keyword, form)| DistributionFilter {
            grammar: Grammar::SkyPatcher,
            kind,
            keyword,
            form,
            strings: strings.clone(),
            forms: forms.clone(),
            level: None,
            levels: Vec::new(),
            traits: clauses.traits,
            count: None,
            chance,
            raw: line.to_string(),
        })
        .collect())
}
