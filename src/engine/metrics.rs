//! Analysis run metrics.
//!
//! Collected unconditionally by [`crate::analyze`]; the stages are coarse
//! enough that timing them costs nothing measurable.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// Walking the data directory and parsing every rule file.
    pub discovery: Duration,
    /// Outfit matching and winner resolution.
    pub matching: Duration,
    /// Reference resolution of every parsed rule.
    pub resolve: Duration,
    /// Keyword ordering plus simulation.
    pub simulation: Duration,
    pub files: usize,
    pub rules: usize,
    pub invalid_lines: usize,
    pub characters: usize,
}
