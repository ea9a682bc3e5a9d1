//! Crate error types.
//!
//! User-authored rule text never produces an [`Error`]: malformed lines come
//! back as a [`LineError`] value and the line is kept as `Invalid`. `Error` is
//! reserved for the outer surfaces (loading a record snapshot, validating a
//! discovery root) and for cancellation.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on a path the caller asked for explicitly.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record snapshot could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Discovery root exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The run was cancelled between two rule applications.
    #[error("cancelled")]
    Cancelled,
}

/// Reason a rule line was dropped by the parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line is empty or a comment")]
    Empty,

    #[error("missing '=' separator")]
    MissingSeparator,

    #[error("unknown keyword '{0}'")]
    UnknownKeyword(String),

    #[error("missing target form")]
    MissingForm,

    #[error("invalid target form '{0}'")]
    InvalidForm(String),

    #[error("too many sections ({0}, at most 6 after the form)")]
    TooManySections(usize),

    #[error("invalid level filter '{0}'")]
    InvalidLevel(String),

    #[error("invalid trait code '{0}'")]
    InvalidTrait(String),

    #[error("invalid chance '{0}'")]
    InvalidChance(String),

    #[error("malformed clause '{0}'")]
    MalformedClause(String),

    #[error("no outfit target clause")]
    MissingTarget,
}
