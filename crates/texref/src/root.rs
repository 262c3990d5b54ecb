//! Project root discovery.
//!
//! A LaTeX project rarely has a manifest, so the root is the nearest ancestor
//! directory holding a file with the marker extension (a `.bib` by default).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves and memoizes scan roots for one marker extension.
#[derive(Debug, Clone)]
pub struct RootLocator {
    marker_extension: String,
    /// Requesting file -> resolved root (or the requesting file itself when unresolved)
    resolved: HashMap<PathBuf, PathBuf>,
}

impl RootLocator {
    pub fn new(marker_extension: impl Into<String>) -> Self {
        Self {
            marker_extension: marker_extension.into(),
            resolved: HashMap::new(),
        }
    }

    pub fn marker_extension(&self) -> &str {
        &self.marker_extension
    }

    /// Root for `requester`, resolving it on first use.
    ///
    /// When no ancestor holds a marker file the requester's own path is
    /// returned. Walking that path yields nothing, so the extractor degrades to
    /// an empty candidate list instead of failing.
    pub fn root_for(&mut self, requester: &Path) -> &Path {
        let marker = self.marker_extension.clone();
        self.resolved
            .entry(requester.to_path_buf())
            .or_insert_with(|| match resolve(requester, &marker) {
                Some(root) => {
                    tracing::info!("Main directory successfully found at {:?}", root);
                    root
                }
                None => {
                    tracing::warn!(
                        "Unable to find a *.{} file above {:?}, falling back to the file itself",
                        marker,
                        requester
                    );
                    requester.to_path_buf()
                }
            })
    }

    /// Previously resolved root, without resolving.
    pub fn cached(&self, requester: &Path) -> Option<&Path> {
        self.resolved.get(requester).map(PathBuf::as_path)
    }

    /// Forget every memoized root.
    pub fn reset(&mut self) {
        self.resolved.clear();
    }
}

/// Ascend from the directory of `start_file` until a directory directly
/// contains a file ending in `.<marker_extension>`.
///
/// Returns `None` once the filesystem root (or an empty parent) is reached
/// without a match.
pub fn resolve(start_file: &Path, marker_extension: &str) -> Option<PathBuf> {
    let mut path = start_file.parent()?.to_path_buf();
    loop {
        if contains_marker(&path, marker_extension) {
            return Some(path);
        }
        match path.parent() {
            Some(parent) if parent != path && !parent.as_os_str().is_empty() => {
                path = parent.to_path_buf();
            }
            _ => return None,
        }
    }
}

fn contains_marker(dir: &Path, marker_extension: &str) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot list {:?}: {}", dir, e);
            return false;
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .any(|entry| has_extension(&entry.path(), marker_extension))
}

/// Whether `path` ends with `.<extension>`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_finds_marker_in_same_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("refs.bib"), "").unwrap();
        let file = temp.path().join("main.tex");
        fs::write(&file, "").unwrap();

        assert_eq!(resolve(&file, "bib"), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_resolve_ascends_to_parent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("refs.bib"), "").unwrap();
        let chapter_dir = temp.path().join("chapters").join("part1");
        fs::create_dir_all(&chapter_dir).unwrap();
        let file = chapter_dir.join("intro.tex");
        fs::write(&file, "").unwrap();

        assert_eq!(resolve(&file, "bib"), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_resolve_stops_at_nearest_marker() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("outer.bib"), "").unwrap();
        let inner = temp.path().join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("inner.bib"), "").unwrap();
        let file = inner.join("main.tex");

        assert_eq!(resolve(&file, "bib"), Some(inner));
    }

    #[test]
    fn test_resolve_terminates_without_marker() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a").join("b").join("main.tex");
        fs::create_dir_all(file.parent().unwrap()).unwrap();

        // An extension nobody uses so the ascent runs all the way to `/`
        assert_eq!(resolve(&file, "texref-no-such-marker"), None);
    }

    #[test]
    fn test_resolve_relative_path_without_parent() {
        assert_eq!(resolve(Path::new("main.tex"), "texref-no-such-marker"), None);
    }

    #[test]
    fn test_root_for_falls_back_to_requester() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("main.tex");
        let mut locator = RootLocator::new("texref-no-such-marker");

        assert_eq!(locator.root_for(&file), file.as_path());
    }

    #[test]
    fn test_root_for_is_memoized_until_reset() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("main.tex");
        let mut locator = RootLocator::new("bib");

        // No marker yet: falls back to the file
        assert_eq!(locator.root_for(&file), file.as_path());

        // Adding a marker does not change the memoized answer
        fs::write(temp.path().join("refs.bib"), "").unwrap();
        assert_eq!(locator.root_for(&file), file.as_path());
        assert_eq!(locator.cached(&file), Some(file.as_path()));

        locator.reset();
        assert!(locator.cached(&file).is_none());
        assert_eq!(locator.root_for(&file), temp.path());
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("refs.bib"), "bib"));
        assert!(!has_extension(Path::new("refs.bib.bak"), "bib"));
        assert!(!has_extension(Path::new("bib"), "bib"));
    }
}
