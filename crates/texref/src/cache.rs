//! Modification-time cache of extraction results.
//!
//! Completion requests fire on nearly every keystroke, so re-reading every
//! `.tex` and `.bib` file in the project each time is not an option. Each
//! extractor keeps one [`FileCache`] and only re-scans files whose
//! modification time moved forward since the last scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{Candidate, Location};

/// What the cache knows about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Modification time observed at the last scan
    pub modified: SystemTime,
    /// Candidates extracted at the last scan (valid while `modified` matches disk)
    pub candidates: Vec<Candidate>,
    /// Every definition site found at the last scan, in file order
    pub definitions: Vec<(String, Location)>,
}

impl TrackedFile {
    fn new(modified: SystemTime) -> Self {
        Self {
            modified,
            candidates: Vec::new(),
            definitions: Vec::new(),
        }
    }
}

/// Outcome of [`FileCache::check_and_mark`].
#[derive(Debug, PartialEq, Eq)]
pub enum CacheLookup<'a> {
    /// Unchanged since the last scan; reuse its candidates and definitions.
    Hit(&'a TrackedFile),
    /// Unknown or modified; the caller must scan and [`FileCache::store`] the result.
    Miss,
}

#[derive(Debug, Default)]
pub struct FileCache {
    files: HashMap<PathBuf, TrackedFile>,
    hits: u64,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `modified` against the recorded time for `path`.
    ///
    /// Unknown files are recorded and reported as a miss. Known files whose
    /// time did not move forward are a hit. Newer times are recorded and
    /// reported as a miss; the stale candidates stay until overwritten by
    /// [`FileCache::store`].
    pub fn check_and_mark(&mut self, path: &Path, modified: SystemTime) -> CacheLookup<'_> {
        let recorded = self.files.get(path).map(|tracked| tracked.modified);
        match recorded {
            None => {
                self.files.insert(path.to_path_buf(), TrackedFile::new(modified));
                CacheLookup::Miss
            }
            Some(previous) if modified > previous => {
                if let Some(tracked) = self.files.get_mut(path) {
                    tracked.modified = modified;
                }
                CacheLookup::Miss
            }
            Some(_) => {
                self.hits += 1;
                match self.files.get(path) {
                    Some(tracked) => CacheLookup::Hit(tracked),
                    None => CacheLookup::Miss,
                }
            }
        }
    }

    /// Overwrite the scan results recorded for `path`.
    pub fn store(
        &mut self,
        path: &Path,
        candidates: Vec<Candidate>,
        definitions: Vec<(String, Location)>,
    ) {
        let tracked = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| TrackedFile::new(SystemTime::UNIX_EPOCH));
        tracked.candidates = candidates;
        tracked.definitions = definitions;
    }

    /// Stop tracking `path`, e.g. after it disappeared from disk.
    pub fn remove(&mut self, path: &Path) -> Option<TrackedFile> {
        self.files.remove(path)
    }

    /// Tracked paths inside `root`.
    pub fn tracked_under(&self, root: &Path) -> Vec<PathBuf> {
        self.files
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    /// Number of lookups answered from the cache. Diagnostics only.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
