//! Identifier classification.
//!
//! A token in a rule can name a record in several ways:
//!
//! ```text
//! Skyrim.esm|0x13BBF     plugin-first key
//! 0x13BBF~Skyrim.esm     id-first key
//! Skyrim.esm             bare plugin filename
//! 0x13BBF                bare id (plugin unknown)
//! GuardOutfit            symbolic name (editor id)
//! GuardOutfit~Mod.esp    symbolic name pinned to a plugin
//! ```
//!
//! Plugin names may contain dots (`My.Cool.Mod.esp`), so the plugin boundary is
//! found by matching a known extension directly followed by the delimiter, not
//! by counting delimiters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Recognized plugin file extensions (lowercase).
pub(crate) const PLUGIN_EXTENSIONS: [&str; 3] = [".esp", ".esm", ".esl"];

/// A `(plugin, id)` pair identifying one record. Plugin names compare
/// case-insensitively.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormKey {
    pub plugin: String,
    pub id: u32,
}

impl FormKey {
    pub fn new(plugin: impl Into<String>, id: u32) -> Self {
        FormKey { plugin: plugin.into(), id }
    }
}

impl PartialEq for FormKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.plugin.eq_ignore_ascii_case(&other.plugin)
    }
}

impl Hash for FormKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.plugin.to_ascii_lowercase().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for FormKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", format_form_id(self.id), self.plugin)
    }
}

impl TryFrom<String> for FormKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match parse_identifier(&value) {
            Some(Identifier::FormKey(key)) => Ok(key),
            _ => Err(format!("'{value}' is not a plugin-qualified form key")),
        }
    }
}

impl From<FormKey> for String {
    fn from(key: FormKey) -> Self {
        key.to_string()
    }
}

/// Classification of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    FormKey(FormKey),
    /// `0x`-prefixed id without a plugin.
    FormId(u32),
    Plugin(String),
    Symbol { name: String, plugin: Option<String> },
}

/// `0x800` style rendering used for ids.
pub fn format_form_id(id: u32) -> String {
    format!("0x{id:X}")
}

/// Parse a hex id (optional `0x`, at most 8 digits).
pub fn parse_form_id(text: &str) -> Option<u32> {
    let text = text.trim();
    if !regex!(r"^(?:0[xX])?[0-9a-fA-F]{1,8}$").is_match(text) {
        return None;
    }
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

/// True when `token` is a bare plugin filename such as `Skyrim.esm`.
pub fn is_plugin_filename(token: &str) -> bool {
    let token = token.trim();
    if token.contains(['|', '~']) {
        return false;
    }
    let lower = token.to_ascii_lowercase();
    PLUGIN_EXTENSIONS.iter().any(|ext| lower.len() > ext.len() && lower.ends_with(ext))
}

/// Byte offset of the `|` that ends a leading plugin name, if any.
///
/// ```text
/// "My.esp.Mod.esp|0x800"
///                ^ first extension directly followed by '|'
/// ```
pub(crate) fn plugin_boundary(token: &str) -> Option<usize> {
    let lower = token.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    (1..bytes.len()).find_map(|i| {
        PLUGIN_EXTENSIONS.iter().find_map(|ext| {
            let end = i + ext.len();
            (bytes[i..].starts_with(ext.as_bytes()) && bytes.get(end) == Some(&b'|')).then_some(end)
        })
    })
}

fn looks_numeric(text: &str) -> bool {
    text.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("0x"))
}

/// Classify a token. Returns `None` for empty input, malformed ids and
/// delimiter layouts that match none of the recognized forms.
pub fn parse_identifier(token: &str) -> Option<Identifier> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    // <id>~<plugin> or <symbol>~<plugin>
    if let Some((left, plugin)) = token.split_once('~') {
        let (left, plugin) = (left.trim(), plugin.trim());
        if left.is_empty() || !is_plugin_filename(plugin) {
            return None;
        }
        if let Some(id) = parse_form_id(left) {
            return Some(Identifier::FormKey(FormKey::new(plugin, id)));
        }
        if looks_numeric(left) {
            return None;
        }
        return Some(Identifier::Symbol { name: left.to_string(), plugin: Some(plugin.to_string()) });
    }

    // <plugin>|<id>
    if let Some(bar) = plugin_boundary(token) {
        let plugin = token[..bar].trim();
        let id = parse_form_id(&token[bar + 1..])?;
        return Some(Identifier::FormKey(FormKey::new(plugin, id)));
    }

    // <symbol>|<plugin>
    if let Some((name, plugin)) = token.split_once('|') {
        let (name, plugin) = (name.trim(), plugin.trim());
        if name.is_empty() || looks_numeric(name) || !is_plugin_filename(plugin) {
            return None;
        }
        return Some(Identifier::Symbol { name: name.to_string(), plugin: Some(plugin.to_string()) });
    }

    if is_plugin_filename(token) {
        return Some(Identifier::Plugin(token.to_string()));
    }

    if looks_numeric(token) {
        return parse_form_id(token).map(Identifier::FormId);
    }

    Some(Identifier::Symbol { name: token.to_string(), plugin: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_spellings_are_equivalent() {
        let expected = Identifier::FormKey(FormKey::new("MyMod.esp", 0x800));
        assert_eq!(parse_identifier("0x800~MyMod.esp"), Some(expected.clone()));
        assert_eq!(parse_identifier("MyMod.esp|0x800"), Some(expected.clone()));
        assert_eq!(parse_identifier("MyMod.esp|800"), Some(expected));
    }

    #[test]
    fn plugin_names_with_dots() {
        assert_eq!(
            parse_identifier("My.esp.Mod.esp|0x12"),
            Some(Identifier::FormKey(FormKey::new("My.esp.Mod.esp", 0x12)))
        );
        assert_eq!(
            parse_identifier("0x12~Cool.Armor.Pack.esl"),
            Some(Identifier::FormKey(FormKey::new("Cool.Armor.Pack.esl", 0x12)))
        );
    }

    #[test]
    fn bare_plugin_and_symbols() {
        assert_eq!(parse_identifier("Skyrim.esm"), Some(Identifier::Plugin("Skyrim.esm".into())));
        assert_eq!(parse_identifier("GuardOutfit"), Some(Identifier::Symbol { name: "GuardOutfit".into(), plugin: None }));
        assert_eq!(
            parse_identifier("GuardOutfit~Dawnguard.esm"),
            Some(Identifier::Symbol { name: "GuardOutfit".into(), plugin: Some("Dawnguard.esm".into()) })
        );
        assert_eq!(
            parse_identifier("GuardOutfit|Dawnguard.esm"),
            Some(Identifier::Symbol { name: "GuardOutfit".into(), plugin: Some("Dawnguard.esm".into()) })
        );
        assert_eq!(parse_identifier("0x00012EB7"), Some(Identifier::FormId(0x12EB7)));
    }

    #[test]
    fn malformed_tokens() {
        assert_eq!(parse_identifier(""), None);
        assert_eq!(parse_identifier("   "), None);
        assert_eq!(parse_identifier("0xZZZ~MyMod.esp"), None);
        assert_eq!(parse_identifier("0x123456789~MyMod.esp"), None);
        assert_eq!(parse_identifier("MyMod.esp|NotHex"), None);
        assert_eq!(parse_identifier("0x800~NotAPlugin"), None);
        assert_eq!(parse_identifier("0xGG"), None);
    }

    #[test]
    fn form_key_equality_ignores_plugin_case() {
        assert_eq!(FormKey::new("Skyrim.esm", 1), FormKey::new("SKYRIM.ESM", 1));
        assert_ne!(FormKey::new("Skyrim.esm", 1), FormKey::new("Skyrim.esm", 2));
        assert_eq!(FormKey::new("Skyrim.esm", 0x13BBF).to_string(), "0x13BBF~Skyrim.esm");
    }
}
