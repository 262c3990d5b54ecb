//! BibTeX citation keys.
//!
//! Keys come from one of two places:
//! - a [`RecordSource`] that understands record fields, which lets candidates
//!   carry a `title (author)` annotation;
//! - a line regex (`@type{key,`) used when no record source is configured.
//!
//! Records of type `string`, `preamble` and `comment` are never citable.

mod reader;

pub use reader::BracedFieldReader;

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::classify::CITATION_TRIGGER;
use crate::extract::{ExtractorKind, Match, ScanStrategy};
use crate::{Candidate, TexrefError};

static ENTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@([A-Za-z]+)\s*\{\s*([^,\s{}]+)\s*,").expect("valid bib entry pattern")
});

/// Record types that never produce a citation key.
pub const NON_CITABLE_TYPES: &[&str] = &["string", "preamble", "comment"];

pub const ELLIPSIS: &str = "...";

/// One bibliography record as produced by a [`RecordSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibRecord {
    /// Record type without the `@`: "article", "book", "string"
    pub entry_type: String,
    /// Citation key
    pub key: String,
    pub title: Option<String>,
    /// Authors in file order, as written ("Knuth, Donald E.")
    pub authors: Vec<String>,
    /// 1-indexed line of the key
    pub line: u32,
    /// 0-indexed byte column of the key
    pub column: u32,
}

/// A record that could not be read. The rest of the file is still used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub line: u32,
    pub reason: String,
}

impl From<RecordError> for TexrefError {
    fn from(err: RecordError) -> Self {
        TexrefError::MalformedRecord {
            line: err.line,
            reason: err.reason,
        }
    }
}

/// Structured reader for bibliography files.
pub trait RecordSource: Send + Sync + std::fmt::Debug {
    /// Records of `content` in file order; malformed records are reported
    /// individually instead of failing the whole file.
    fn read_records(&self, path: &Path, content: &str) -> Vec<Result<BibRecord, RecordError>>;
}

/// Strategy for `.bib` files.
#[derive(Debug)]
pub struct BibStrategy {
    extension: String,
    source: Option<Box<dyn RecordSource>>,
    title_max_len: usize,
}

impl BibStrategy {
    /// Regex-only extraction; candidates carry no annotation.
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            source: None,
            title_max_len: 30,
        }
    }

    pub fn with_source(mut self, source: Box<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_title_max_len(mut self, title_max_len: usize) -> Self {
        self.title_max_len = title_max_len;
        self
    }

    fn scan_records(&self, source: &dyn RecordSource, path: &Path, content: &str) -> Vec<Match> {
        let mut matches = Vec::new();
        for record in source.read_records(path, content) {
            match record {
                Ok(record) => {
                    let annotation = annotation(&record, self.title_max_len);
                    let mut m = Match::new(record.key, record.line, record.column);
                    m.tag = Some(record.entry_type);
                    m.annotation = annotation;
                    matches.push(m);
                }
                Err(err) => {
                    tracing::debug!("Skipping record in {:?}: {}", path, TexrefError::from(err));
                }
            }
        }
        matches
    }
}

impl ScanStrategy for BibStrategy {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::BibEntry
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn trigger(&self) -> &Regex {
        &CITATION_TRIGGER
    }

    fn scan(&self, path: &Path, content: &str) -> Vec<Match> {
        match &self.source {
            Some(source) => self.scan_records(source.as_ref(), path, content),
            None => scan_entry_lines(content),
        }
    }

    fn excludes(&self, m: &Match) -> bool {
        m.tag.as_deref().is_some_and(|tag| {
            NON_CITABLE_TYPES
                .iter()
                .any(|t| tag.eq_ignore_ascii_case(t))
        })
    }

    fn decorate(&self, m: &Match) -> Candidate {
        Candidate::new(m.identifier.clone())
            .with_kind(Some(ExtractorKind::BibEntry.label().to_string()))
            .with_annotation(m.annotation.clone())
    }
}

/// Regex fallback: every line starting with `@type{key,`.
fn scan_entry_lines(content: &str) -> Vec<Match> {
    let mut matches = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(caps) = ENTRY_PATTERN.captures(line) {
            if let (Some(entry_type), Some(key)) = (caps.get(1), caps.get(2)) {
                let mut m = Match::new(key.as_str(), idx as u32 + 1, key.start() as u32);
                m.tag = Some(entry_type.as_str().to_string());
                matches.push(m);
            }
        }
    }
    matches
}

/// `"<title> (<author>)"`, dropping whichever part is empty.
pub fn annotation(record: &BibRecord, title_max_len: usize) -> Option<String> {
    let title = smart_truncate(record.title.as_deref().unwrap_or(""), title_max_len);
    let author = collapse_authors(&record.authors);
    match (title.is_empty(), author.is_empty()) {
        (true, true) => None,
        (false, true) => Some(title),
        (true, false) => Some(format!("({})", author)),
        (false, false) => Some(format!("{} ({})", title, author)),
    }
}

/// Cut `content` to at most `length` characters at a word boundary and
/// append [`ELLIPSIS`]. A single overlong word is cut mid-word.
pub fn smart_truncate(content: &str, length: usize) -> String {
    if content.chars().count() <= length {
        return content.to_string();
    }
    let keep = (length + 1).saturating_sub(ELLIPSIS.len());
    let head: String = content.chars().take(keep).collect();
    let words: Vec<&str> = head.split(' ').collect();
    let cut = words[..words.len() - 1].join(" ");
    if cut.trim().is_empty() {
        let hard: String = content
            .chars()
            .take(length.saturating_sub(ELLIPSIS.len()))
            .collect();
        return format!("{}{}", hard, ELLIPSIS);
    }
    format!("{}{}", cut, ELLIPSIS)
}

/// One author verbatim, several as "<first> et al.". Commas inside names
/// ("Knuth, Donald") become spaces.
pub fn collapse_authors(authors: &[String]) -> String {
    let first = match authors.first() {
        Some(first) => first.replace(", ", " ").replace(',', " "),
        None => return String::new(),
    };
    if authors.len() == 1 {
        first
    } else {
        format!("{} et al.", first)
    }
}
