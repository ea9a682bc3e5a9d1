//! `Keyword = form|strings|forms|level|traits|count|chance` lines.
//!
//! ```text
//! Outfit = 0x800~MyMod.esp|*Guard+-Stormcloak|Skyrim.esm|5/20|M/-U|NONE|50
//! └──┬─┘   └─────┬───────┘ └───────┬───────┘ └───┬────┘ └┬─┘ └─┬─┘ └┬─┘ └┬┘
//! keyword   form id         strings           forms    level traits count chance
//! ```
//!
//! Every section after the form is positional and optional; `NONE` or an
//! empty slot means "unconstrained". [`DistributionFilter::format`] writes the
//! minimal equivalent line back.

use super::ident::{is_plugin_filename, parse_form_id, parse_identifier, plugin_boundary};
use super::sections::{parse_levels, parse_section, parse_traits, write_section, write_traits};
use crate::error::LineError;
use crate::{DEFAULT_CHANCE, DistributionFilter, FilterSection, Grammar, TargetKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Maximum number of `|` sections after the form identifier.
const MAX_SECTIONS: usize = 6;

static DEFAULT_KEYWORDS: Lazy<KeywordTable> = Lazy::new(|| {
    KeywordTable::from_pairs([
        ("Spell", TargetKind::Spell),
        ("Perk", TargetKind::Perk),
        ("Item", TargetKind::Item),
        ("Shout", TargetKind::Shout),
        ("LevSpell", TargetKind::LevSpell),
        ("Package", TargetKind::Package),
        ("Outfit", TargetKind::Outfit),
        ("SleepOutfit", TargetKind::SleepOutfit),
        ("Keyword", TargetKind::Keyword),
        ("Faction", TargetKind::Faction),
        ("DeathItem", TargetKind::DeathItem),
        ("Skin", TargetKind::Skin),
    ])
});

/// Case-insensitive keyword → target-kind lookup.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    entries: HashMap<String, TargetKind>,
}

impl KeywordTable {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, TargetKind)>) -> Self {
        let entries = pairs.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        KeywordTable { entries }
    }

    /// Restrict the table to the given kinds (e.g. outfit-only previews).
    pub fn only(&self, kinds: &[TargetKind]) -> Self {
        let entries = self.entries.iter().filter(|(_, v)| kinds.contains(v)).map(|(k, v)| (k.clone(), *v)).collect();
        KeywordTable { entries }
    }

    pub fn lookup(&self, keyword: &str) -> Option<TargetKind> {
        self.entries.get(&keyword.trim().to_ascii_lowercase()).copied()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        DEFAULT_KEYWORDS.clone()
    }
}

/// Cut a trailing `;` or `#` comment.
pub fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Split the right-hand side into `(form, rest)`.
///
/// The form itself may contain `|` (`Skyrim.esm|0x800`, `Name|Mod.esp`), so
/// the split point depends on what the first segments look like.
fn split_form(value: &str) -> (&str, Option<&str>) {
    let Some(first_bar) = value.find('|') else {
        return (value, None);
    };
    let after = &value[first_bar + 1..];
    let second = after.find('|').map(|i| first_bar + 1 + i);
    let second_seg = &value[first_bar + 1..second.unwrap_or(value.len())];

    let first_seg = &value[..first_bar];
    let plugin_first = plugin_boundary(value) == Some(first_bar) && parse_form_id(second_seg).is_some();
    let symbol_with_plugin = !is_plugin_filename(first_seg) && is_plugin_filename(second_seg);

    // `0x800~Mod.esp` already carries its plugin.
    if !first_seg.contains('~') && (plugin_first || symbol_with_plugin) {
        match second {
            Some(end) => (&value[..end], Some(&value[end + 1..])),
            None => (value, None),
        }
    } else {
        (&value[..first_bar], Some(after))
    }
}

fn section_text(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("NONE") { None } else { Some(text) }
}

/// Parse a chance value: integers (decimals truncate), clamped to `0..=100`.
pub(crate) fn parse_chance(text: &str) -> Result<u8, LineError> {
    let text = text.trim();
    let value = match text.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match text.parse::<f64>() {
            Ok(f) if f.is_finite() => f.trunc() as i64,
            _ => return Err(LineError::InvalidChance(text.to_string())),
        },
    };
    Ok(value.clamp(0, 100) as u8)
}

/// Parse one `Keyword = ...` line.
pub fn parse_line(line: &str, table: &KeywordTable) -> Result<DistributionFilter, LineError> {
    let text = strip_comment(line).trim();
    if text.is_empty() {
        return Err(LineError::Empty);
    }

    let (keyword, value) = text.split_once('=').ok_or(LineError::MissingSeparator)?;
    let keyword = keyword.trim();
    let kind = table.lookup(keyword).ok_or_else(|| LineError::UnknownKeyword(keyword.to_string()))?;

    let (form, rest) = split_form(value.trim());
    let form = form.trim();
    if form.is_empty() {
        return Err(LineError::MissingForm);
    }
    if parse_identifier(form).is_none() {
        return Err(LineError::InvalidForm(form.to_string()));
    }

    let sections: Vec<&str> = rest.map(|r| r.split('|').collect()).unwrap_or_default();
    if sections.len() > MAX_SECTIONS {
        return Err(LineError::TooManySections(sections.len()));
    }
    let section = |idx: usize| sections.get(idx).and_then(|s| section_text(s));

    let strings = section(0).map(parse_section).unwrap_or_default();
    let forms = section(1).map(parse_section).unwrap_or_default();
    let level = section(2).map(str::to_string);
    let levels = match &level {
        Some(text) => parse_levels(text)?,
        None => Vec::new(),
    };
    let traits = section(3).map(parse_traits).transpose()?.unwrap_or_default();
    let count = section(4).map(str::to_string);
    let chance = section(5).map(parse_chance).transpose()?.unwrap_or(DEFAULT_CHANCE);

    Ok(DistributionFilter {
        grammar: Grammar::Distr,
        kind,
        keyword: keyword.to_string(),
        form: form.to_string(),
        strings,
        forms,
        level,
        levels,
        traits,
        count,
        chance,
        raw: line.to_string(),
    })
}

fn non_empty(section: &FilterSection) -> Option<String> {
    if section.is_empty() { None } else { Some(write_section(section)) }
}

impl DistributionFilter {
    /// Minimal text for this filter.
    ///
    /// Interior gaps are written as `NONE`, trailing gaps and the default
    /// chance are dropped:
    ///
    /// ```text
    /// Outfit = X|NONE|NONE|NONE|NONE|NONE|100  =>  Outfit = X
    /// Outfit = X|NONE|Skyrim.esm               =>  Outfit = X|NONE|Skyrim.esm
    /// ```
    ///
    /// Clause lines are written back as their comment-free text.
    pub fn format(&self) -> String {
        if self.grammar == Grammar::SkyPatcher {
            return strip_comment(&self.raw).trim().to_string();
        }

        let mut sections = vec![
            non_empty(&self.strings),
            non_empty(&self.forms),
            self.level.clone(),
            if self.traits.is_empty() { None } else { Some(write_traits(&self.traits)) },
            self.count.clone(),
            if self.chance == DEFAULT_CHANCE { None } else { Some(self.chance.to_string()) },
        ];
        while matches!(sections.last(), Some(None)) {
            sections.pop();
        }

        let mut out = format!("{} = {}", self.keyword, self.form);
        for section in sections {
            out.push('|');
            out.push_str(section.as_deref().unwrap_or("NONE"));
        }
        out
    }
}
