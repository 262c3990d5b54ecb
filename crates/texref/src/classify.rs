//! Completion target classification.
//!
//! Decides, from the text left of the cursor, which kinds of candidates the
//! user is asking for. Each extractor owns one trigger pattern; the patterns
//! here are anchored to the end of the text so only the argument currently
//! being typed counts.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::extract::ExtractorKind;

/// `\ref{`, `\pageref{`, `\eqref{`, `\autoref{`, `\cref{`, ...
pub static REFERENCE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[A-Za-z]*ref\*?\{[^}]*$").expect("valid reference trigger")
});

/// `\begin{` and `\end{`
pub static ENVIRONMENT_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:begin|end)\{[^}]*$").expect("valid environment trigger")
});

/// `\cite{`, `\citep[p.~3]{`, `\parencite*{`, `\cite{a, ` ...
pub static CITATION_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[A-Za-z]*cite[A-Za-z]*\*?(?:\[[^\]]*\])*\{[^}]*$")
        .expect("valid citation trigger")
});

/// Summary of a classification, mirroring the set of wanted kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationState {
    None,
    Cite,
    Label,
    Environment,
    /// More than one family matched on the same line
    All,
}

/// Set of extractor kinds wanted for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Targets {
    wanted: [bool; ExtractorKind::COUNT],
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ExtractorKind) {
        self.wanted[kind.index()] = true;
    }

    pub fn contains(&self, kind: ExtractorKind) -> bool {
        self.wanted[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.wanted.iter().any(|w| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = ExtractorKind> + '_ {
        ExtractorKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    pub fn state(&self) -> ClassificationState {
        let mut kinds = self.iter();
        match (kinds.next(), kinds.next()) {
            (None, _) => ClassificationState::None,
            (Some(_), Some(_)) => ClassificationState::All,
            (Some(ExtractorKind::BibEntry), None) => ClassificationState::Cite,
            (Some(ExtractorKind::Reference), None) => ClassificationState::Label,
            (Some(ExtractorKind::Environment), None) => ClassificationState::Environment,
        }
    }
}

impl FromIterator<ExtractorKind> for Targets {
    fn from_iter<I: IntoIterator<Item = ExtractorKind>>(iter: I) -> Self {
        let mut targets = Targets::new();
        for kind in iter {
            targets.insert(kind);
        }
        targets
    }
}

/// Whether the in-progress token starts on a lone backslash, i.e. the user
/// is still typing a command name and no argument exists yet.
pub fn starts_at_escape(line: &str, start_column: usize) -> bool {
    let bytes = line.as_bytes();
    match bytes.get(start_column) {
        Some(b'\\') => start_column == 0 || bytes[start_column - 1] != b'\\',
        _ => false,
    }
}

/// Text left of `column`, clamped to the line and to a char boundary.
pub fn before_cursor(line: &str, column: usize) -> &str {
    &line[..floor_char_boundary(line, column)]
}

pub(crate) fn floor_char_boundary(line: &str, column: usize) -> usize {
    let mut column = column.min(line.len());
    while !line.is_char_boundary(column) {
        column -= 1;
    }
    column
}
