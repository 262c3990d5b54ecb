//! In-memory store of open documents.
//!
//! Completion is requested while the user types, so the current line must come
//! from the editor's buffer rather than from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::completion::byte_offset;

/// A document tracked in memory.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub version: i32,
    /// Language id announced by the client ("latex", "tex", "plaintex", ...)
    pub language_id: String,
}

impl Document {
    pub fn new(content: String, version: i32, language_id: String) -> Self {
        Self {
            content,
            version,
            language_id,
        }
    }

    /// Apply full or incremental changes.
    pub fn apply_changes(&mut self, changes: Vec<TextDocumentContentChangeEvent>, new_version: i32) {
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = self.position_to_offset(&range.start);
                    let end = self.position_to_offset(&range.end);
                    if let (Some(start), Some(end)) = (start, end) {
                        if start <= end {
                            self.content.replace_range(start..end, &change.text);
                        }
                    }
                }
                None => self.content = change.text,
            }
        }
        self.version = new_version;
    }

    /// Byte offset of an LSP position (UTF-16 columns).
    fn position_to_offset(&self, position: &Position) -> Option<usize> {
        let mut offset = 0;
        for (current_line, line) in self.content.split_inclusive('\n').enumerate() {
            if current_line as u32 == position.line {
                let text = line.trim_end_matches(['\n', '\r']);
                return Some(offset + byte_offset(text, position.character));
            }
            offset += line.len();
        }

        // Position just past the last line
        let lines = self.content.split_inclusive('\n').count() as u32;
        (position.line == lines && position.character == 0).then_some(self.content.len())
    }
}

/// Thread-safe store for open documents.
#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    documents: Arc<RwLock<HashMap<PathBuf, Document>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, uri: &Url, content: String, version: i32, language_id: String) {
        if let Ok(path) = uri.to_file_path() {
            let document = Document::new(content, version, language_id);
            self.documents.write().await.insert(path, document);
        }
    }

    pub async fn change(&self, uri: &Url, changes: Vec<TextDocumentContentChangeEvent>, version: i32) {
        if let Ok(path) = uri.to_file_path() {
            let mut docs = self.documents.write().await;
            if let Some(doc) = docs.get_mut(&path) {
                doc.apply_changes(changes, version);
            }
        }
    }

    pub async fn close(&self, uri: &Url) {
        if let Ok(path) = uri.to_file_path() {
            self.documents.write().await.remove(&path);
        }
    }

    pub async fn language_id(&self, path: &Path) -> Option<String> {
        self.documents
            .read()
            .await
            .get(path)
            .map(|doc| doc.language_id.clone())
    }

    /// In-memory content when open, otherwise the file on disk.
    pub async fn get_content(&self, path: &Path) -> Option<String> {
        {
            let docs = self.documents.read().await;
            if let Some(doc) = docs.get(path) {
                return Some(doc.content.clone());
            }
        }
        std::fs::read_to_string(path).ok()
    }

    /// One line (0-indexed) of a document, without its line terminator.
    pub async fn get_line(&self, path: &Path, line: u32) -> Option<String> {
        let content = self.get_content(path).await?;
        content.lines().nth(line as usize).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Range;

    fn change(range: Option<Range>, text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range,
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_position_to_offset() {
        let doc = Document::new("\\label{a}\n\\ref{".to_string(), 1, "latex".to_string());
        assert_eq!(doc.position_to_offset(&Position::new(0, 0)), Some(0));
        assert_eq!(doc.position_to_offset(&Position::new(1, 5)), Some(15));
        assert_eq!(doc.position_to_offset(&Position::new(5, 0)), None);
    }

    #[test]
    fn test_apply_full_change() {
        let mut doc = Document::new("old".to_string(), 1, "latex".to_string());
        doc.apply_changes(vec![change(None, "new")], 2);
        assert_eq!(doc.content, "new");
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn test_apply_incremental_change() {
        let mut doc = Document::new("see \\ref{}".to_string(), 1, "latex".to_string());
        doc.apply_changes(
            vec![change(
                Some(Range::new(Position::new(0, 9), Position::new(0, 9))),
                "intro",
            )],
            2,
        );
        assert_eq!(doc.content, "see \\ref{intro}");
    }

    #[test]
    fn test_incremental_change_after_multibyte_text() {
        let mut doc = Document::new("café \\ref{}".to_string(), 1, "latex".to_string());
        // "café \ref{" is 10 UTF-16 units but 11 bytes
        doc.apply_changes(
            vec![change(
                Some(Range::new(Position::new(0, 10), Position::new(0, 10))),
                "x",
            )],
            2,
        );
        assert_eq!(doc.content, "café \\ref{x}");
    }

    #[tokio::test]
    async fn test_document_store_open_close() {
        let store = DocumentStore::new();
        let uri = Url::parse("file:///texref-test/main.tex").unwrap();
        let path = uri.to_file_path().unwrap();

        assert!(store.get_content(&path).await.is_none());

        store
            .open(&uri, "line0\n\\cite{".to_string(), 1, "latex".to_string())
            .await;
        assert_eq!(store.get_line(&path, 1).await.as_deref(), Some("\\cite{"));
        assert_eq!(store.language_id(&path).await.as_deref(), Some("latex"));

        store.close(&uri).await;
        assert!(store.get_content(&path).await.is_none());
    }

    #[tokio::test]
    async fn test_document_store_change() {
        let store = DocumentStore::new();
        let uri = Url::parse("file:///texref-test/main.tex").unwrap();
        let path = uri.to_file_path().unwrap();

        store.open(&uri, "hello".to_string(), 1, "tex".to_string()).await;
        store.change(&uri, vec![change(None, "goodbye")], 2).await;

        assert_eq!(store.get_content(&path).await.as_deref(), Some("goodbye"));
    }
}
