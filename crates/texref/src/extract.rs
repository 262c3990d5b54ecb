//! Candidate extraction.
//!
//! One [`Extractor`] struct carries everything the extractor kinds share:
//! root resolution, the directory walk, the modification-time cache, the goto
//! index and de-duplication. What differs between kinds (file extension,
//! trigger, line pattern, exclusions, decoration) lives behind [`ScanStrategy`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::cache::{CacheLookup, FileCache};
use crate::classify::{ENVIRONMENT_TRIGGER, REFERENCE_TRIGGER};
use crate::goto::GotoIndex;
use crate::root::RootLocator;
use crate::walk::{self, WalkOptions};
use crate::{Candidate, Location};

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\label\{([^}]+)\}").expect("valid label pattern"));

static ENVIRONMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:(?:re)?newenvironment|newtheorem)\*?\{([^}]+)\}")
        .expect("valid environment pattern")
});

/// The candidate families, in the order their results are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Reference,
    Environment,
    BibEntry,
}

impl ExtractorKind {
    pub const COUNT: usize = 3;
    pub const ALL: [ExtractorKind; Self::COUNT] = [
        ExtractorKind::Reference,
        ExtractorKind::Environment,
        ExtractorKind::BibEntry,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ExtractorKind::Reference => 0,
            ExtractorKind::Environment => 1,
            ExtractorKind::BibEntry => 2,
        }
    }

    /// Category label shown next to candidates.
    pub fn label(self) -> &'static str {
        match self {
            ExtractorKind::Reference => "Ref",
            ExtractorKind::Environment => "Env",
            ExtractorKind::BibEntry => "Cite",
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractorKind::Reference => write!(f, "reference"),
            ExtractorKind::Environment => write!(f, "environment"),
            ExtractorKind::BibEntry => write!(f, "bibentry"),
        }
    }
}

/// One identifier pulled out of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub identifier: String,
    /// 1-indexed line
    pub line: u32,
    /// 0-indexed byte column of the identifier start
    pub column: u32,
    /// Record type or command that produced the match, for exclusion checks
    pub tag: Option<String>,
    pub annotation: Option<String>,
}

impl Match {
    pub fn new(identifier: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            identifier: identifier.into(),
            line,
            column,
            tag: None,
            annotation: None,
        }
    }
}

/// Per-kind behaviour plugged into an [`Extractor`].
pub trait ScanStrategy: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ExtractorKind;

    /// Extension of the files this strategy reads, without the dot.
    fn extension(&self) -> &str;

    /// Pattern matched against the text left of the cursor.
    fn trigger(&self) -> &Regex;

    /// Every match in `content`, in file order. Duplicates are allowed.
    fn scan(&self, path: &Path, content: &str) -> Vec<Match>;

    /// Matches for which this returns true never become candidates.
    fn excludes(&self, _m: &Match) -> bool {
        false
    }

    fn decorate(&self, m: &Match) -> Candidate;
}

/// Line-pattern strategy for `\label`s and environment definitions.
///
/// Candidates are displayed wrapped in braces and tagged with the kind label.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    kind: ExtractorKind,
    extension: String,
    line_pattern: Regex,
    trigger: Regex,
}

impl PatternStrategy {
    pub fn new(kind: ExtractorKind, extension: &str, line_pattern: Regex, trigger: Regex) -> Self {
        Self {
            kind,
            extension: extension.to_string(),
            line_pattern,
            trigger,
        }
    }

    /// `\label{...}` definitions, offered after `\ref{`-like commands.
    pub fn references(extension: &str) -> Self {
        Self::new(
            ExtractorKind::Reference,
            extension,
            LABEL_PATTERN.clone(),
            REFERENCE_TRIGGER.clone(),
        )
    }

    /// `\newenvironment{...}` / `\newtheorem{...}` definitions, offered after `\begin{`.
    pub fn environments(extension: &str) -> Self {
        Self::new(
            ExtractorKind::Environment,
            extension,
            ENVIRONMENT_PATTERN.clone(),
            ENVIRONMENT_TRIGGER.clone(),
        )
    }
}

impl ScanStrategy for PatternStrategy {
    fn kind(&self) -> ExtractorKind {
        self.kind
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn trigger(&self) -> &Regex {
        &self.trigger
    }

    fn scan(&self, _path: &Path, content: &str) -> Vec<Match> {
        scan_lines(&self.line_pattern, content)
    }

    fn decorate(&self, m: &Match) -> Candidate {
        Candidate::new(m.identifier.clone())
            .with_display(Some(format!("{{{}}}", m.identifier)))
            .with_kind(Some(self.kind.label().to_string()))
    }
}

/// Apply `pattern` to every line of `content`; group 1 is the identifier.
pub(crate) fn scan_lines(pattern: &Regex, content: &str) -> Vec<Match> {
    let mut matches = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for caps in pattern.captures_iter(line) {
            if let Some(id) = caps.get(1) {
                matches.push(Match::new(id.as_str(), idx as u32 + 1, id.start() as u32));
            }
        }
    }
    matches
}

/// Diagnostics counters for one extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractorStats {
    /// Files answered from the cache
    pub cache_hits: u64,
    /// Files read and matched
    pub scans: u64,
    pub tracked_files: usize,
    pub goto_entries: usize,
}

/// Root resolution, walking, caching and goto recording for one kind.
#[derive(Debug)]
pub struct Extractor {
    strategy: Box<dyn ScanStrategy>,
    roots: RootLocator,
    cache: FileCache,
    goto: GotoIndex,
    walk: WalkOptions,
    wanted: bool,
    scans: u64,
}

impl Extractor {
    pub fn new(strategy: Box<dyn ScanStrategy>, marker_extension: &str, walk: WalkOptions) -> Self {
        Self {
            strategy,
            roots: RootLocator::new(marker_extension),
            cache: FileCache::new(),
            goto: GotoIndex::new(),
            walk,
            wanted: false,
            scans: 0,
        }
    }

    pub fn kind(&self) -> ExtractorKind {
        self.strategy.kind()
    }

    pub fn extension(&self) -> &str {
        self.strategy.extension()
    }

    /// Match the trigger against the text left of the cursor and remember the
    /// answer for the next [`Extractor::produce_targets`].
    pub fn should_use(&mut self, before_cursor: &str) -> bool {
        self.wanted = self.strategy.trigger().is_match(before_cursor);
        self.wanted
    }

    pub fn set_wanted(&mut self, wanted: bool) {
        self.wanted = wanted;
    }

    pub fn is_wanted(&self) -> bool {
        self.wanted
    }

    /// Candidates for a completion request from `requester`.
    ///
    /// Returns nothing, without touching the filesystem, unless the last
    /// classification marked this extractor as wanted.
    pub fn produce_targets(&mut self, requester: &Path) -> Vec<Candidate> {
        if !self.wanted {
            return Vec::new();
        }
        self.collect(requester)
    }

    /// Walk and scan regardless of classification, e.g. before a goto lookup.
    pub fn refresh(&mut self, requester: &Path) -> Vec<Candidate> {
        self.collect(requester)
    }

    /// Scan root for `requester`, resolving it on first use.
    pub fn root_for(&mut self, requester: &Path) -> PathBuf {
        self.roots.root_for(requester).to_path_buf()
    }

    pub fn goto(&self) -> &GotoIndex {
        &self.goto
    }

    pub fn stats(&self) -> ExtractorStats {
        ExtractorStats {
            cache_hits: self.cache.hits(),
            scans: self.scans,
            tracked_files: self.cache.len(),
            goto_entries: self.goto.len(),
        }
    }

    /// Forget memoized roots. Cached file results stay valid.
    pub fn reset_roots(&mut self) {
        self.roots.reset();
    }

    fn collect(&mut self, requester: &Path) -> Vec<Candidate> {
        let root = self.root_for(requester);
        let walked = walk::find_files(&root, self.strategy.extension(), &self.walk);
        // A walk cut short by the timeout says nothing about missing files
        if walked.complete {
            self.prune(&root, &walked.files);
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for file in walked.files {
            for candidate in self.candidates_for(&file) {
                if seen.insert(candidate.identifier.clone()) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    /// Forget tracked files under `root` that a complete walk no longer found.
    fn prune(&mut self, root: &Path, found: &[PathBuf]) {
        let found: HashSet<&Path> = found.iter().map(PathBuf::as_path).collect();
        for path in self.cache.tracked_under(root) {
            if !found.contains(path.as_path()) {
                tracing::debug!("Forgetting {:?}, no longer part of {:?}", path, root);
                self.forget(&path);
            }
        }
    }

    fn forget(&mut self, file: &Path) {
        self.cache.remove(file);
        self.goto.forget_file(file);
    }

    fn candidates_for(&mut self, file: &Path) -> Vec<Candidate> {
        let modified = match fs::metadata(file).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!("Skipping {:?}: {}", file, e);
                self.forget(file);
                return Vec::new();
            }
        };

        // Hits re-record their definitions: a rescan of another file may have
        // dropped an identifier this file still defines
        if let CacheLookup::Hit(tracked) = self.cache.check_and_mark(file, modified) {
            tracing::debug!("Cache hit for {:?}", file);
            for (identifier, location) in &tracked.definitions {
                self.goto.record(identifier, location.clone());
            }
            return tracked.candidates.clone();
        }

        let (candidates, definitions) = self.scan_file(file);
        self.cache.store(file, candidates.clone(), definitions);
        candidates
    }

    /// Candidates of `file` plus every definition site, recorded into the goto index.
    fn scan_file(&mut self, file: &Path) -> (Vec<Candidate>, Vec<(String, Location)>) {
        self.scans += 1;
        self.goto.forget_file(file);

        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping unreadable file {:?}: {}", file, e);
                return (Vec::new(), Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut definitions = Vec::new();
        for m in self.strategy.scan(file, &content) {
            if self.strategy.excludes(&m) {
                continue;
            }
            let location = Location::new(file.to_path_buf(), m.line, m.column);
            self.goto.record(&m.identifier, location.clone());
            definitions.push((m.identifier.clone(), location));
            if seen.insert(m.identifier.clone()) {
                candidates.push(self.strategy.decorate(&m));
            }
        }
        (candidates, definitions)
    }
}
