//! Matching, resolution and simulation engine.
//!
//! Everything here runs on already-parsed rules (see [`crate::grammar`]) and
//! an already-loaded record store.
//!
//! ## How the parts work together
//!
//! ```text
//! DistributionFile[] ─┬─ processing_order ── resolve_outfit_winners   (winner.rs)
//!                     │        │                  └─ matches            (matcher.rs)
//!                     │        │                  └─ chance gate        (chance.rs)
//!                     │        v
//!                     │   CharacterOutfitAssignment[]
//!                     │
//!                     ├─ keyword rules ── order_keyword_rules (Kahn)   (keywords.rs)
//!                     │                       │
//!                     │                       v
//!                     │                  simulate_keywords
//!                     │                    - one rule at a time
//!                     │                    - whole population per rule (rayon)
//!                     │                    - matches_with_keywords + chance gate
//!                     │
//!                     └─ resolve_filter + VirtualKeywords               (references.rs)
//!                            └─ typed references, unresolved residue
//! ```
//!
//! ## Responsibilities by module
//!
//! - `matcher.rs`: pure filter evaluation against one `CharacterRecord`.
//! - `chance.rs`: the deterministic percentage gate.
//! - `winner.rs`: winner-takes-last outfit resolution with contenders.
//! - `keywords.rs`: keyword dependency graph, ordering and simulation.
//! - `references.rs`: predicate text to record-store references.
//! - `metrics.rs`: per-stage timings for [`crate::analyze`].
//!
//! ## Concurrency
//!
//! Matching never mutates shared state, so per-character work fans out with
//! rayon. The keyword rule loop itself is sequential: one rule's effect must
//! be complete across the population before the next rule is evaluated.
//! Cancellation is checked between rules.

#[path = "engine/chance.rs"]
mod chance;
#[path = "engine/keywords.rs"]
mod keywords;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/references.rs"]
mod references;
#[path = "engine/winner.rs"]
mod winner;

pub use chance::chance_gate;
pub use keywords::{
    CancelFlag, KeywordAcquisition, KeywordDistributionEntry, KeywordOrder, KeywordSimulation, order_keyword_rules,
    simulate_keywords, topological_sort,
};
pub use matcher::{matches, matches_with_keywords};
pub use metrics::RunMetrics;
pub use references::{Resolution, ResolvedFilter, ResolvedPart, VirtualKeywords, resolve_filter};
pub use winner::{CharacterOutfitAssignment, OutfitContender, processing_order, resolve_outfit_winners};
