mod report;

use distrule::{CancelFlag, Context, KeywordTable, Options, Snapshot, analyze, parse_clause_line, parse_line};
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "distrule=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let code = match config.mode {
        Mode::Format(lines) => format_lines(&lines, config.color),
        Mode::Analyze { data, records } => run_analysis(&data, records.as_deref(), config.color),
    };
    std::process::exit(code);
}

enum Mode {
    Analyze { data: PathBuf, records: Option<PathBuf> },
    Format(Vec<String>),
}

struct CliConfig {
    mode: Mode,
    color: bool,
}

fn run_analysis(data: &Path, records: Option<&Path>, color: bool) -> i32 {
    let snapshot = match records.map(Snapshot::load).transpose() {
        Ok(snapshot) => snapshot.unwrap_or_default(),
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    let (store, characters) = snapshot.into_parts();

    let context = Context::new(&store, &characters);
    match analyze(data, &context, &Options::default(), &CancelFlag::new()) {
        Ok(analysis) => {
            report::print_analysis(&analysis, &characters, color);
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

/// Form A is tried first; a line it rejects is retried as Form B.
fn format_lines(lines: &[String], color: bool) -> i32 {
    let table = KeywordTable::default();
    let results: Vec<_> = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let formatted = parse_line(line, &table).map(|f| vec![f.format()]).or_else(|err| {
                parse_clause_line(line).map(|filters| filters.iter().map(|f| f.format()).collect()).map_err(|_| err)
            });
            (line.as_str(), formatted)
        })
        .collect();

    report::print_formatted(&results, color);
    if results.iter().all(|(_, r)| r.is_ok()) { 0 } else { 1 }
}

fn parse_args() -> Result<CliConfig, String> {
    let mut data: Option<PathBuf> = None;
    let mut records: Option<PathBuf> = None;
    let mut format: Option<Vec<String>> = None;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("distrule {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--data" | "-d" => {
                let value = args.next().ok_or_else(|| "error: --data expects a directory".to_string())?;
                data = Some(PathBuf::from(value));
            }
            "--records" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --records expects a file".to_string())?;
                records = Some(PathBuf::from(value));
            }
            "--format" | "-f" => {
                let value = args.next().ok_or_else(|| "error: --format expects a rule line".to_string())?;
                format.get_or_insert_with(Vec::new).push(value);
            }
            "--" => {
                let rest: Vec<String> = args.collect();
                format.get_or_insert_with(Vec::new).extend(rest);
                break;
            }
            _ if arg.starts_with("--data=") => data = Some(PathBuf::from(arg.trim_start_matches("--data="))),
            _ if arg.starts_with("--records=") => {
                records = Some(PathBuf::from(arg.trim_start_matches("--records=")));
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => return Err(format!("error: unexpected argument '{arg}'\n\n{}", help_text())),
        }
    }

    let mode = match (data, format) {
        (Some(_), Some(_)) => return Err("error: --data and --format cannot be combined".to_string()),
        (Some(data), None) => Mode::Analyze { data, records },
        (None, Some(lines)) if lines.iter().any(|l| l == "-") => Mode::Format(read_stdin_lines()?),
        (None, Some(lines)) => Mode::Format(lines),
        (None, None) => return Err(format!("error: nothing to do\n\n{}", help_text())),
    };

    Ok(CliConfig { mode, color })
}

fn read_stdin_lines() -> Result<Vec<String>, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer.lines().map(str::to_string).collect())
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "distrule {version}

Distribution-rule analyzer.

Usage:
  distrule [OPTIONS] --data <dir> [--records <snapshot.json>]
  distrule [OPTIONS] --format <line> [--format <line>...]
  distrule [OPTIONS] -- <line...>

Options:
  -d, --data <dir>           Data directory holding *_DISTR.ini files and
                             SKSE/Plugins/SkyPatcher/npc/**/*.ini.
  -r, --records <file>       Record snapshot (JSON) to match against.
                             Default: empty store, no characters.
  -f, --format <line>        Parse a rule line and print its minimal form.
                             Use '-' to read lines from stdin.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Logging:
  RUST_LOG=distrule=debug    Show dropped lines and unresolved references.

Exit codes:
  0  Success.
  1  Analysis failed or a rule line was rejected.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
