//! Rule-file discovery and per-file parsing.
//!
//! Two layouts are scanned under the data directory:
//!
//! ```text
//! <data>/*_DISTR.ini                            Form A, top level only
//! <data>/SKSE/Plugins/SkyPatcher/npc/**/*.ini   Form B, recursive
//! ```
//!
//! Traversal is sequential (walkdir), reading and parsing is parallel
//! (rayon). Symlinks are followed, since mod managers often deploy rule files
//! as links; a link loop or a second link to an already visited target is
//! logged and skipped. A file that cannot be read is logged and skipped too;
//! it never aborts the scan. The result is sorted by path so repeated scans
//! are identical.

use crate::api::Options;
use crate::error::{Error, LineError, Result};
use crate::grammar::{KeywordTable, parse_clause_line, parse_line};
use crate::{DistributionFilter, Grammar};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// What one physical line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    /// Form A lines yield one filter; Form B lines one per target clause.
    Filters(Vec<DistributionFilter>),
    Invalid(LineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLine {
    /// 1-based.
    pub number: usize,
    pub raw: String,
    pub kind: LineKind,
}

/// One parsed rule file. Invalid lines are kept with their raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionFile {
    pub path: PathBuf,
    pub grammar: Grammar,
    pub lines: Vec<DistributionLine>,
    /// Target form text of every outfit rule, in line order.
    pub outfit_keys: Vec<String>,
}

impl DistributionFile {
    pub fn parse(path: impl Into<PathBuf>, grammar: Grammar, text: &str, table: &KeywordTable) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let lines: Vec<DistributionLine> = text
            .lines()
            .enumerate()
            .map(|(idx, raw)| DistributionLine { number: idx + 1, raw: raw.to_string(), kind: classify(raw, grammar, table) })
            .collect();

        let outfit_keys = lines
            .iter()
            .filter_map(|line| match &line.kind {
                LineKind::Filters(filters) => Some(filters),
                _ => None,
            })
            .flatten()
            .filter(|f| f.kind.is_outfit())
            .map(|f| f.form.clone())
            .collect();

        DistributionFile { path: path.into(), grammar, lines, outfit_keys }
    }

    /// `(line number, filter)` for every parsed rule, in file order.
    pub fn filters(&self) -> impl Iterator<Item = (usize, &DistributionFilter)> {
        self.lines.iter().flat_map(|line| {
            let filters: &[DistributionFilter] = match &line.kind {
                LineKind::Filters(filters) => filters,
                _ => &[],
            };
            filters.iter().map(move |f| (line.number, f))
        })
    }

    pub fn invalid_lines(&self) -> impl Iterator<Item = (&DistributionLine, &LineError)> {
        self.lines.iter().filter_map(|line| match &line.kind {
            LineKind::Invalid(err) => Some((line, err)),
            _ => None,
        })
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }
}

fn classify(raw: &str, grammar: Grammar, table: &KeywordTable) -> LineKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return LineKind::Comment;
    }

    let parsed = match grammar {
        Grammar::Distr => parse_line(raw, table).map(|f| vec![f]),
        Grammar::SkyPatcher => parse_clause_line(raw),
    };
    match parsed {
        Ok(filters) => LineKind::Filters(filters),
        Err(err) => {
            tracing::debug!(line = trimmed, error = %err, "dropping rule line");
            LineKind::Invalid(err)
        }
    }
}

// --- Discovery ------------------------------------------------------------------

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.len() > suffix.len() && name.to_lowercase().ends_with(&suffix.to_lowercase()))
}

/// `false` for a symlink whose target was already reached through another link.
fn first_visit(entry: &DirEntry, visited: &mut HashSet<PathBuf>) -> bool {
    if !entry.path_is_symlink() {
        return true;
    }
    match entry.path().canonicalize() {
        Ok(target) if !visited.insert(target.clone()) => {
            tracing::warn!("skipping repeated symlink target: {}", entry.path().display());
            false
        }
        _ => true,
    }
}

fn walk(root: &Path, max_depth: usize, mut keep: impl FnMut(&Path) -> bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| first_visit(e, &mut visited));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && keep(entry.path()) => found.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => tracing::warn!("error accessing entry: {}", e),
        }
    }
    found
}

/// Find, read and parse every rule file under `data_dir`.
pub fn discover_files(data_dir: &Path, options: &Options) -> Result<Vec<DistributionFile>> {
    if !data_dir.is_dir() {
        return Err(Error::NotADirectory(data_dir.to_path_buf()));
    }

    let mut candidates: Vec<(PathBuf, Grammar)> = Vec::new();
    if options.include_distr {
        let suffix = options.distr_suffix.as_str();
        candidates.extend(walk(data_dir, 1, |p| has_suffix(p, suffix)).into_iter().map(|p| (p, Grammar::Distr)));
    }
    if options.include_skypatcher {
        let root = data_dir.join(&options.skypatcher_dir);
        if root.is_dir() {
            candidates.extend(
                walk(&root, usize::MAX, |p| has_suffix(p, ".ini")).into_iter().map(|p| (p, Grammar::SkyPatcher)),
            );
        }
    }

    tracing::debug!("{} candidate rule files", candidates.len());

    let mut files: Vec<DistributionFile> = candidates
        .par_iter()
        .filter_map(|(path, grammar)| match std::fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                Some(DistributionFile::parse(path.clone(), *grammar, &text, &options.keywords))
            }
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn data_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Guards_DISTR.ini"), "; guards\n\nOutfit = GuardOutfit|*Guard\nArmor = X\n").unwrap();
        fs::write(dir.path().join("notes.ini"), "Outfit = Ignored").unwrap();

        let nested = dir.path().join("SKSE/Plugins/SkyPatcher/npc/MyMod");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("outfits.ini"), "filterByKeywords=ActorTypeNPC:outfitDefault=MyMod.esp|0x800\n").unwrap();
        fs::write(nested.join("readme.txt"), "not a rule file").unwrap();

        let deep = dir.path().join("sub");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("Deep_DISTR.ini"), "Outfit = Deep").unwrap();
        dir
    }

    #[test]
    fn finds_both_layouts() {
        let dir = data_dir();
        let files = discover_files(dir.path(), &Options::default()).unwrap();

        let names: Vec<(&str, Grammar)> = files.iter().map(|f| (f.file_name(), f.grammar)).collect();
        assert_eq!(names, vec![("Guards_DISTR.ini", Grammar::Distr), ("outfits.ini", Grammar::SkyPatcher)]);
    }

    #[test]
    fn lines_are_tagged() {
        let dir = data_dir();
        let files = discover_files(dir.path(), &Options::default()).unwrap();
        let distr = files.iter().find(|f| f.grammar == Grammar::Distr).unwrap();

        let kinds: Vec<&str> = distr
            .lines
            .iter()
            .map(|l| match l.kind {
                LineKind::Blank => "blank",
                LineKind::Comment => "comment",
                LineKind::Filters(_) => "filters",
                LineKind::Invalid(_) => "invalid",
            })
            .collect();
        assert_eq!(kinds, vec!["comment", "blank", "filters", "invalid"]);
        assert_eq!(distr.outfit_keys, vec!["GuardOutfit"]);
        assert_eq!(distr.filters().map(|(n, _)| n).collect::<Vec<_>>(), vec![3]);

        let (line, err) = distr.invalid_lines().next().unwrap();
        assert_eq!(line.raw, "Armor = X");
        assert_eq!(*err, LineError::UnknownKeyword("Armor".into()));
    }

    #[test]
    fn layouts_can_be_disabled() {
        let dir = data_dir();
        let options = Options { include_skypatcher: false, ..Options::default() };
        let files = discover_files(dir.path(), &options).unwrap();
        assert!(files.iter().all(|f| f.grammar == Grammar::Distr));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(discover_files(&missing, &Options::default()), Err(Error::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_rule_files_are_followed() {
        use std::os::unix::fs::symlink;

        let dir = data_dir();
        let staging = TempDir::new().unwrap();
        let linked = staging.path().join("Linked_DISTR.ini");
        fs::write(&linked, "Outfit = Linked|*Guard\n").unwrap();
        symlink(&linked, dir.path().join("Linked_DISTR.ini")).unwrap();

        let npc = dir.path().join("SKSE/Plugins/SkyPatcher/npc");
        symlink(&npc, npc.join("MyMod/loop")).unwrap();

        let files = discover_files(dir.path(), &Options::default()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["Guards_DISTR.ini", "Linked_DISTR.ini", "outfits.ini"]);
        assert_eq!(files[1].filters().count(), 1);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let file = DistributionFile::parse("a_DISTR.ini", Grammar::Distr, "\u{feff}Outfit = A", &KeywordTable::default());
        assert!(matches!(file.lines[0].kind, LineKind::Filters(_)));
    }
}
