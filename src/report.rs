use distrule::{Analysis, CharacterOutfitAssignment, CharacterRecord, Grammar, LineError};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

/// Rows printed per section before collapsing into "+N more".
const LIMIT: usize = 20;

pub fn print_analysis(analysis: &Analysis, characters: &[CharacterRecord], color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Analyzing {} rule files", analysis.files.len()), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Files ━━━", ansi::GRAY));
    print_files(analysis, &palette);

    println!("\n{}", palette.paint("━━━ Outfit conflicts ━━━", ansi::GRAY));
    let conflicts: Vec<&CharacterOutfitAssignment> = analysis.conflicts().collect();
    if conflicts.is_empty() {
        println!("{}", palette.dim("  No character is matched by more than one outfit rule"));
    }
    for assignment in conflicts.iter().take(LIMIT) {
        print_assignment(assignment, &palette);
    }
    more(conflicts.len(), &palette);

    println!("\n{}", palette.paint("━━━ Keywords ━━━", ansi::GRAY));
    print_keywords(analysis, characters, &palette);

    let unresolved: Vec<_> = analysis.unresolved().collect();
    if !unresolved.is_empty() {
        let (resolved, total) = analysis.reference_counts();
        println!(
            "\n{} {}",
            palette.paint("━━━ Unresolved references ━━━", ansi::GRAY),
            palette.dim(format!("({resolved} of {total} resolved)"))
        );
        for (path, line, text) in unresolved.iter().take(LIMIT) {
            let file = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            println!("  {} {}", palette.dim(format!("{file}:{line}")), palette.paint(text, ansi::YELLOW));
        }
        more(unresolved.len(), &palette);
    }

    let m = &analysis.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Discovery: {}  │  Resolve: {}  │  Matching: {}  │  Keywords: {}",
        palette.paint(format!("{:?}", m.total), ansi::GREEN),
        palette.paint(format!("{:?}", m.discovery), ansi::CYAN),
        palette.dim(format!("{:?}", m.resolve)),
        palette.dim(format!("{:?}", m.matching)),
        palette.dim(format!("{:?}", m.simulation)),
    );
    println!(
        "  {}",
        palette.dim(format!("{} rules, {} rejected lines, {} characters", m.rules, m.invalid_lines, m.characters))
    );
    println!();
}

fn more(total: usize, palette: &ansi::Palette) {
    if total > LIMIT {
        println!("  {}", palette.dim(format!("... +{} more", total - LIMIT)));
    }
}

fn print_files(analysis: &Analysis, palette: &ansi::Palette) {
    if analysis.files.is_empty() {
        println!("{}", palette.dim("  No rule files found"));
        return;
    }

    for file in &analysis.files {
        let grammar = match file.grammar {
            Grammar::Distr => "distr",
            Grammar::SkyPatcher => "skypatcher",
        };
        let rules = file.filters().count();
        let invalid: Vec<_> = file.invalid_lines().collect();

        println!(
            "  {} {} {}",
            palette.paint(file.file_name(), ansi::BLUE),
            palette.dim(format!("[{grammar}]")),
            palette.paint(format!("{rules} rules"), ansi::GREEN),
        );
        for (line, err) in invalid {
            println!(
                "      {} {} {}",
                palette.paint(format!("line {}:", line.number), ansi::RED),
                palette.dim(line.raw.trim()),
                palette.paint(format!("({err})"), ansi::YELLOW),
            );
        }
    }
}

fn print_assignment(assignment: &CharacterOutfitAssignment, palette: &ansi::Palette) {
    println!(
        "  {} {}",
        palette.bold(&assignment.editor_id),
        palette.dim(format!("({})", assignment.character)),
    );
    for (idx, contender) in assignment.contenders.iter().enumerate() {
        let file = contender.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let marker = if assignment.winner == Some(idx) {
            palette.paint("✓", ansi::GREEN)
        } else if !contender.passed_chance {
            palette.paint("✗", ansi::RED)
        } else {
            palette.dim("·")
        };
        println!(
            "    {} {} {} {}",
            marker,
            palette.paint(&contender.outfit, ansi::CYAN),
            palette.dim(format!("{file}:{}", contender.line)),
            if contender.chance < 100 { palette.dim(format!("{}%", contender.chance)) } else { String::new() },
        );
    }
}

fn print_keywords(analysis: &Analysis, characters: &[CharacterRecord], palette: &ansi::Palette) {
    let order = &analysis.keyword_order;
    if order.ordered.is_empty() && order.cyclic.is_empty() {
        println!("{}", palette.dim("  No keyword rules"));
        return;
    }

    let chain: Vec<&str> = order.ordered.iter().map(|e| e.keyword.as_str()).collect();
    println!("  {} {}", palette.dim("order:"), palette.paint(chain.join(" → "), ansi::CYAN));
    if !order.cyclic.is_empty() {
        println!("  {} {}", palette.paint("cyclic (skipped):", ansi::RED), order.cyclic.join(", "));
    }

    let gained: Vec<(&CharacterRecord, String)> = characters
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| {
            let acquired = analysis.simulation.acquired_by(idx);
            if acquired.is_empty() {
                return None;
            }
            let keywords: Vec<&str> = acquired.iter().map(|a| a.keyword.as_str()).collect();
            Some((c, keywords.join(", ")))
        })
        .collect();

    println!(
        "  {} {}",
        palette.dim("acquired:"),
        palette.paint(format!("{} keywords across {} characters", analysis.simulation.total(), gained.len()), ansi::GREEN),
    );
    for (character, keywords) in gained.iter().take(LIMIT) {
        println!("    {} {}", palette.paint(character.editor_id(), ansi::BLUE), palette.dim(keywords));
    }
    more(gained.len(), palette);
}

pub fn print_formatted(results: &[(&str, Result<Vec<String>, LineError>)], color: bool) {
    let palette = ansi::Palette::new(color);
    for (input, result) in results {
        match result {
            Ok(lines) => {
                for line in lines {
                    println!("{}", palette.paint(line, ansi::GREEN));
                }
            }
            Err(err) => {
                println!("{} {}", palette.paint(format!("✗ {err}:"), ansi::RED), palette.dim(input.trim()));
            }
        }
    }
}
