//! Section parsers and writers.
//!
//! String and form sections share one grammar: `,` separates OR-groups, `+`
//! separates AND-parts, a leading `-` negates a part and `*` marks a wildcard.
//!
//! One quirk needs care. A comma segment that starts with `-` and has no `+`
//! does not open a new OR-group; it attaches to the group before it:
//!
//! ```text
//! A+B,-C,-D   =>  (A ∧ B ∧ ¬C ∧ ¬D)          one expression
//! A,B         =>  (A) ∨ (B)                   two expressions
//! -C,A        =>  ¬C ∧ (A)                    leading exclusion
//! ```
//!
//! The tokenizer is therefore two-pass: [`classify`] tags every comma segment,
//! then [`parse_section`] builds the tree from the tags.

use crate::error::LineError;
use crate::{FilterExpression, FilterPart, FilterSection, LevelEntry, TraitFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Opens a new OR-group.
    Group(&'a str),
    /// AND-NOT condition on the preceding group.
    Attach(&'a str),
    /// AND-NOT condition on the whole section (no group before it).
    Exclude(&'a str),
}

fn classify(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut seen_group = false;

    for raw in text.split(',') {
        let seg = raw.trim();
        if seg.is_empty() {
            continue;
        }
        if seg.starts_with('-') && !seg.contains('+') {
            segments.push(if seen_group { Segment::Attach(seg) } else { Segment::Exclude(seg) });
        } else {
            seen_group = true;
            segments.push(Segment::Group(seg));
        }
    }

    segments
}

/// Parse a string or form section. Empty text yields the match-all section.
pub fn parse_section(text: &str) -> FilterSection {
    let mut section = FilterSection::default();

    for segment in classify(text) {
        match segment {
            Segment::Group(seg) => {
                let parts: Vec<FilterPart> = seg.split('+').filter_map(FilterPart::parse).collect();
                if !parts.is_empty() {
                    section.expressions.push(FilterExpression { parts, attached: Vec::new() });
                }
            }
            Segment::Attach(seg) => {
                let Some(part) = FilterPart::parse(seg) else { continue };
                match section.expressions.last_mut() {
                    Some(expr) => expr.attached.push(part),
                    // The group it followed produced no parts (e.g. a lone `*`).
                    None => section.exclusions.push(part),
                }
            }
            Segment::Exclude(seg) => {
                if let Some(part) = FilterPart::parse(seg) {
                    section.exclusions.push(part);
                }
            }
        }
    }

    section
}

/// Write a section back in the same shape it was parsed from.
pub(crate) fn write_section(section: &FilterSection) -> String {
    let mut items: Vec<String> = section.exclusions.iter().map(|p| p.to_string()).collect();

    for expr in &section.expressions {
        items.push(expr.parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("+"));
        items.extend(expr.attached.iter().map(|p| p.to_string()));
    }

    items.join(",")
}

// --- Traits -------------------------------------------------------------------

/// Parse `F/-U/S` style trait codes.
pub(crate) fn parse_traits(text: &str) -> Result<TraitFilters, LineError> {
    let mut traits = TraitFilters::default();

    for raw in text.split('/') {
        let code = raw.trim();
        if code.is_empty() {
            continue;
        }
        let (negated, letter) = match code.strip_prefix('-') {
            Some(rest) => (true, rest.trim()),
            None => (false, code),
        };
        let value = !negated;
        let slot = match letter.to_ascii_uppercase().as_str() {
            "F" => {
                traits.female = Some(value);
                continue;
            }
            "M" => {
                traits.female = Some(!value);
                continue;
            }
            "U" => &mut traits.unique,
            "S" => &mut traits.summonable,
            "C" => &mut traits.child,
            "L" => &mut traits.leveled,
            "T" => &mut traits.teammate,
            "D" => &mut traits.dead,
            _ => return Err(LineError::InvalidTrait(code.to_string())),
        };
        *slot = Some(value);
    }

    Ok(traits)
}

/// Canonical order: F/M, U, S, C, L, T, D.
pub(crate) fn write_traits(traits: &TraitFilters) -> String {
    let mut codes = Vec::new();
    match traits.female {
        Some(true) => codes.push("F".to_string()),
        Some(false) => codes.push("M".to_string()),
        None => {}
    }
    let flags = [
        ("U", traits.unique),
        ("S", traits.summonable),
        ("C", traits.child),
        ("L", traits.leveled),
        ("T", traits.teammate),
        ("D", traits.dead),
    ];
    for (code, value) in flags {
        match value {
            Some(true) => codes.push(code.to_string()),
            Some(false) => codes.push(format!("-{code}")),
            None => {}
        }
    }
    codes.join("/")
}

// --- Level --------------------------------------------------------------------

/// Parse `5`, `5/20` and `14(50/75)` entries separated by commas.
pub(crate) fn parse_levels(text: &str) -> Result<Vec<LevelEntry>, LineError> {
    let invalid = || LineError::InvalidLevel(text.to_string());
    let number = |s: &str| s.parse::<u16>().map_err(|_| invalid());
    let mut entries = Vec::new();

    for raw in text.split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        if let Some(caps) = regex!(r"^(\d+)\s*\(\s*(\d+)\s*(?:/\s*(\d+)\s*)?\)$").captures(entry) {
            let max = caps.get(3).map(|m| number(m.as_str())).transpose()?;
            entries.push(LevelEntry::Skill { skill: number(&caps[1])?, min: number(&caps[2])?, max });
            continue;
        }

        let caps = regex!(r"^(\d+)\s*(?:/\s*(\d+))?$").captures(entry).ok_or_else(invalid)?;
        let min = number(&caps[1])?;
        match caps.get(2) {
            Some(max) => entries.push(LevelEntry::Range(min, number(max.as_str())?)),
            None => entries.push(LevelEntry::Min(min)),
        }
    }

    Ok(entries)
}
