//! Per-request orchestration.
//!
//! The [`CompletionCoordinator`] owns one extractor per kind, each behind its
//! own mutex. A request locks an extractor for the whole classify-and-scan
//! step, so overlapping requests never interleave cache updates, while
//! different kinds can be scanned concurrently.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bib::{BibStrategy, BracedFieldReader};
use crate::classify::{self, Targets};
use crate::config::Config;
use crate::extract::{Extractor, ExtractorKind, ExtractorStats, PatternStrategy};
use crate::walk::WalkOptions;
use crate::{Candidate, Location, Result, TexrefError};

/// A completion or goto request as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// File being edited
    pub file: PathBuf,
    /// Full text of the current line
    pub line: String,
    /// 0-indexed byte offset of the cursor in `line`
    pub column: usize,
    /// 0-indexed byte offset where the token being typed starts
    pub start_column: usize,
}

impl CompletionRequest {
    /// Build a request, deriving `start_column` from the text before the cursor.
    pub fn new(file: impl Into<PathBuf>, line: impl Into<String>, column: usize) -> Self {
        let line = line.into();
        let column = classify::floor_char_boundary(&line, column);
        let start_column = token_start(&line, column);
        Self {
            file: file.into(),
            line,
            column,
            start_column,
        }
    }

    pub fn with_start_column(mut self, start_column: usize) -> Self {
        self.start_column = start_column;
        self
    }

    pub fn before_cursor(&self) -> &str {
        classify::before_cursor(&self.line, self.column)
    }

    /// Text typed since `start_column`.
    pub fn query(&self) -> &str {
        let start = classify::floor_char_boundary(&self.line, self.start_column.min(self.column));
        &self.line[start..self.column]
    }
}

/// Start of the token ending at `column`.
///
/// Tokens stop at braces, brackets, commas and whitespace. A command name
/// (`\ci|`) starts at its backslash.
fn token_start(line: &str, column: usize) -> usize {
    let before = &line[..column];
    let start = before
        .char_indices()
        .rev()
        .find(|(_, c)| is_token_boundary(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    if start > 0 && before[..start].ends_with('\\') && !before[..start].ends_with("\\\\") {
        start - 1
    } else {
        start
    }
}

fn is_token_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | ',' | '\\')
}

/// Brace-delimited identifier under `column`, e.g. `b` in `\cite{a, b}`.
pub fn identifier_at(line: &str, column: usize) -> Option<&str> {
    let column = classify::floor_char_boundary(line, column);
    let (before, after) = line.split_at(column);
    let open = before.rfind('{')?;
    if before[open..].contains('}') {
        return None;
    }
    let start = before.rfind([',', '{']).map(|i| i + 1)?;
    let end = after
        .find([',', '}'])
        .map(|i| column + i)
        .unwrap_or(line.len());
    let identifier = line[start..end].trim();
    (!identifier.is_empty()).then_some(identifier)
}

/// Named host commands; all of them jump to the definition under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    GoToDefinition,
    GoToDeclaration,
    GoTo,
}

impl Subcommand {
    pub const ALL: [Subcommand; 3] = [
        Subcommand::GoToDefinition,
        Subcommand::GoToDeclaration,
        Subcommand::GoTo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subcommand::GoToDefinition => "GoToDefinition",
            Subcommand::GoToDeclaration => "GoToDeclaration",
            Subcommand::GoTo => "GoTo",
        }
    }
}

impl FromStr for Subcommand {
    type Err = TexrefError;

    fn from_str(s: &str) -> Result<Self> {
        Subcommand::ALL
            .into_iter()
            .find(|cmd| cmd.name() == s)
            .ok_or_else(|| TexrefError::UnknownSubcommand(s.to_string()))
    }
}

#[derive(Debug)]
pub struct CompletionCoordinator {
    config: Config,
    /// One extractor per kind, in concatenation order
    extractors: Vec<Mutex<Extractor>>,
}

impl CompletionCoordinator {
    /// Reference, environment and bibliography extractors built from `config`.
    pub fn new(config: Config) -> Self {
        let walk = WalkOptions::from_config(&config);
        let marker = config.marker_extension.as_str();

        let mut bib = BibStrategy::new(&config.bibliography_extension)
            .with_title_max_len(config.title_max_len);
        if config.use_record_reader {
            bib = bib.with_source(Box::new(BracedFieldReader::new()));
        }

        let extractors = vec![
            Extractor::new(
                Box::new(PatternStrategy::references(&config.source_extension)),
                marker,
                walk.clone(),
            ),
            Extractor::new(
                Box::new(PatternStrategy::environments(&config.source_extension)),
                marker,
                walk.clone(),
            ),
            Extractor::new(Box::new(bib), marker, walk),
        ];
        Self::with_extractors(config, extractors)
    }

    /// Coordinator over custom extractors. They are ordered by kind.
    pub fn with_extractors(config: Config, mut extractors: Vec<Extractor>) -> Self {
        extractors.sort_by_key(|e| e.kind());
        Self {
            config,
            extractors: extractors.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Filetypes this completer serves.
    pub fn supported_filetypes(&self) -> &[String] {
        &self.config.filetypes
    }

    /// Ask every extractor whether the text before the cursor triggers it.
    pub fn classify(&self, request: &CompletionRequest) -> Targets {
        let mut targets = Targets::new();
        for extractor in &self.extractors {
            let mut extractor = lock(extractor);
            if self.mark(&mut extractor, request) {
                targets.insert(extractor.kind());
            }
        }
        targets
    }

    pub fn should_use(&self, request: &CompletionRequest) -> bool {
        !self.classify(request).is_empty()
    }

    /// Candidates of every wanted extractor, concatenated in kind order.
    pub fn compute_candidates(&self, request: &CompletionRequest) -> Vec<Candidate> {
        tracing::debug!("Completion query {:?} in {:?}", request.query(), request.file);
        let mut candidates = Vec::new();
        for extractor in &self.extractors {
            let mut extractor = lock(extractor);
            self.mark(&mut extractor, request);
            candidates.extend(extractor.produce_targets(&request.file));
        }
        candidates
    }

    /// Scan with every extractor so goto lookups see the current files.
    /// Returns the number of distinct identifiers found.
    pub fn refresh_index(&self, requester: &Path) -> usize {
        self.extractors
            .iter()
            .map(|extractor| lock(extractor).refresh(requester).len())
            .sum()
    }

    /// Definition site of `identifier` from whatever extractor recorded it.
    pub fn resolve_definition(&self, identifier: &str) -> Result<Location> {
        self.extractors
            .iter()
            .find_map(|extractor| lock(extractor).goto().get(identifier).cloned())
            .ok_or_else(|| TexrefError::DefinitionNotFound(identifier.to_string()))
    }

    /// Run a named host command against the identifier under the cursor.
    pub fn run_subcommand(&self, name: &str, request: &CompletionRequest) -> Result<Location> {
        match name.parse::<Subcommand>()? {
            Subcommand::GoToDefinition | Subcommand::GoToDeclaration | Subcommand::GoTo => {
                let identifier = identifier_at(&request.line, request.column).unwrap_or_default();
                self.resolve_definition(identifier)
            }
        }
    }

    /// Names accepted by [`CompletionCoordinator::run_subcommand`].
    pub fn defined_subcommands(&self) -> Vec<&'static str> {
        Subcommand::ALL.iter().map(|cmd| cmd.name()).collect()
    }

    /// Human readable state for `requester`, resolving roots if needed.
    pub fn debug_info(&self, requester: &Path) -> String {
        let mut lines = Vec::new();
        for extractor in &self.extractors {
            let mut extractor = lock(extractor);
            let root = extractor.root_for(requester);
            let stats = extractor.stats();
            lines.push(format!(
                "Looking for *.{} in {} ({}: {} files, {} cache hits, {} scans)",
                extractor.extension(),
                root.display(),
                extractor.kind(),
                stats.tracked_files,
                stats.cache_hits,
                stats.scans
            ));
        }
        lines.join("\n")
    }

    pub fn stats(&self) -> Vec<(ExtractorKind, ExtractorStats)> {
        self.extractors
            .iter()
            .map(|extractor| {
                let extractor = lock(extractor);
                (extractor.kind(), extractor.stats())
            })
            .collect()
    }

    /// Forget memoized roots, e.g. after the workspace layout changed.
    pub fn reset_roots(&self) {
        for extractor in &self.extractors {
            lock(extractor).reset_roots();
        }
    }

    fn mark(&self, extractor: &mut Extractor, request: &CompletionRequest) -> bool {
        if classify::starts_at_escape(&request.line, request.start_column) {
            extractor.set_wanted(false);
            return false;
        }
        extractor.should_use(request.before_cursor())
    }
}

/// A panic in another request must not take the index down with it.
fn lock(extractor: &Mutex<Extractor>) -> MutexGuard<'_, Extractor> {
    extractor.lock().unwrap_or_else(PoisonError::into_inner)
}
