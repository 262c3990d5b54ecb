//! texref: incremental citation, label and environment index for LaTeX
//!
//! This crate provides the building blocks for LaTeX completion and navigation:
//! - Project root discovery from a marker file (usually a `.bib`)
//! - Line-oriented extraction of `\label`s, environment definitions and BibTeX keys
//! - A modification-time cache so unchanged files are never re-read
//! - Classification of the text left of the cursor into completion targets
//! - Goto-definition lookups populated as a by-product of scanning

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod bib;
pub mod cache;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod extract;
pub mod goto;
pub mod root;
pub mod walk;

// Re-export main types
pub use bib::{BibRecord, BibStrategy, BracedFieldReader, RecordError, RecordSource};
pub use classify::{ClassificationState, Targets};
pub use config::Config;
pub use coordinator::{identifier_at, CompletionCoordinator, CompletionRequest, Subcommand};
pub use extract::{Extractor, ExtractorKind, ExtractorStats, PatternStrategy, ScanStrategy};
pub use goto::GotoIndex;

/// A definition site: file, 1-indexed line and 0-indexed byte column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,   // 1-indexed line
    pub column: u32, // 0-indexed byte offset of the identifier start
}

impl Location {
    pub fn new(file: PathBuf, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// One completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Text inserted on completion: "intro", "knuth1984"
    pub identifier: String,
    /// Menu text, e.g. "{intro}" for labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Category label used for grouping ("Ref", "Env", "Cite")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Human readable extra information, e.g. "The TeXbook (Donald Knuth)"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Candidate {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display: None,
            kind: None,
            annotation: None,
        }
    }

    pub fn with_display(mut self, display: Option<String>) -> Self {
        self.display = display;
        self
    }

    pub fn with_kind(mut self, kind: Option<String>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_annotation(mut self, annotation: Option<String>) -> Self {
        self.annotation = annotation;
        self
    }
}

/// Errors surfaced to callers.
///
/// Missing roots, unreadable files and malformed bibliography records are
/// absorbed where they happen and only show up in the logs.
#[derive(Debug, thiserror::Error)]
pub enum TexrefError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Can't jump to definition or declaration: '{0}' is not indexed")]
    DefinitionNotFound(String),

    #[error("Unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, TexrefError>;
