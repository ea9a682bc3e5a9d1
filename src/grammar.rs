//! Rule text grammars.
//!
//! Everything that turns authored text into the filter model lives here. The
//! layering is strictly leaf-first:
//!
//! ```text
//! token ── parse_identifier (ident.rs)        FormKey | FormId | Plugin | Symbol
//!            │
//! section ── parse_section (sections.rs)      OR of AND of parts + exclusions
//!            │
//! line ──┬── parse_line (line.rs)             `Outfit = form|...|chance`
//!        └── parse_clause_line (skypatcher.rs) `filterByNpcs=...:outfitDefault=...`
//! ```
//!
//! Parsing never panics on user text: identifiers come back as `Option`, lines
//! as `Result<_, LineError>` so the caller can keep the raw line and move on.
//!
//! Formatting is the inverse of `parse_line`: `DistributionFilter::format`
//! emits the minimal form of a rule (no trailing `NONE`, no default chance).

#[path = "grammar/ident.rs"]
mod ident;
#[path = "grammar/line.rs"]
mod line;
#[path = "grammar/sections.rs"]
mod sections;
#[path = "grammar/skypatcher.rs"]
mod skypatcher;


pub use ident::{FormKey, Identifier, format_form_id, is_plugin_filename, parse_form_id, parse_identifier};
pub use line::{KeywordTable, parse_line, strip_comment};
pub use sections::parse_section;
pub use skypatcher::parse_clause_line;
