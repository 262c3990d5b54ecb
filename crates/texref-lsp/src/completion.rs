//! Conversions between core results and LSP types.
//!
//! The core speaks 1-indexed lines and 0-indexed byte columns; LSP positions
//! are 0-indexed lines and UTF-16 code unit columns.

use texref::Candidate;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionItemLabelDetails, Location, Position, Range, Url,
};

/// Client language ids that name the same filetype as a configured one.
const LANGUAGE_ALIASES: &[(&str, &str)] = &[("latex", "tex")];

/// Whether a document announced as `language_id` is served.
pub fn serves(filetypes: &[String], language_id: &str) -> bool {
    let canonical = LANGUAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == language_id)
        .map(|(_, target)| *target)
        .unwrap_or(language_id);
    filetypes.iter().any(|ft| ft == language_id || ft == canonical)
}

fn to_completion_kind(kind: Option<&str>) -> CompletionItemKind {
    match kind {
        Some("Ref") => CompletionItemKind::REFERENCE,
        Some("Env") => CompletionItemKind::MODULE,
        Some("Cite") => CompletionItemKind::VALUE,
        _ => CompletionItemKind::TEXT,
    }
}

/// The inserted text is always the bare identifier.
#[must_use]
pub fn to_completion_item(candidate: Candidate) -> CompletionItem {
    let kind = to_completion_kind(candidate.kind.as_deref());
    let detail = candidate.annotation.or(candidate.display);
    CompletionItem {
        label: candidate.identifier.clone(),
        label_details: candidate.kind.map(|kind| CompletionItemLabelDetails {
            detail: None,
            description: Some(kind),
        }),
        kind: Some(kind),
        detail,
        insert_text: Some(candidate.identifier),
        ..Default::default()
    }
}

/// Byte offset in `line` of a UTF-16 column, clamped to the line length.
pub fn byte_offset(line: &str, utf16_column: u32) -> usize {
    let mut units = 0u32;
    for (i, c) in line.char_indices() {
        if units >= utf16_column {
            return i;
        }
        units += c.len_utf16() as u32;
    }
    line.len()
}

/// UTF-16 column of a byte offset in `line`.
pub fn utf16_column(line: &str, byte: usize) -> u32 {
    line.char_indices()
        .take_while(|(i, _)| *i < byte)
        .map(|(_, c)| c.len_utf16() as u32)
        .sum()
}

/// `line_text` is the definition's line, when available, for the UTF-16 conversion.
pub fn to_lsp_location(location: &texref::Location, line_text: Option<&str>) -> Option<Location> {
    let uri = Url::from_file_path(&location.file).ok()?;
    let line = location.line.saturating_sub(1);
    let character = match line_text {
        Some(text) => utf16_column(text, location.column as usize),
        None => location.column,
    };
    let start = Position::new(line, character);
    Some(Location {
        uri,
        range: Range::new(start, start),
    })
}
