//! Identifier -> definition site lookups.

use std::collections::HashMap;
use std::path::Path;

use crate::{Location, Result, TexrefError};

/// Definition sites recorded while scanning.
///
/// Keys are raw identifiers exactly as extracted. A later record for the same
/// identifier replaces the earlier one.
#[derive(Debug, Default)]
pub struct GotoIndex {
    entries: HashMap<String, Location>,
}

impl GotoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, identifier: &str, location: Location) {
        self.entries.insert(identifier.to_string(), location);
    }

    pub fn get(&self, identifier: &str) -> Option<&Location> {
        self.entries.get(identifier)
    }

    /// Definition site of `identifier`, or [`TexrefError::DefinitionNotFound`].
    pub fn resolve(&self, identifier: &str) -> Result<Location> {
        self.get(identifier)
            .cloned()
            .ok_or_else(|| TexrefError::DefinitionNotFound(identifier.to_string()))
    }

    /// Drop every entry pointing into `file`. Called before a file is re-scanned.
    pub fn forget_file(&mut self, file: &Path) {
        self.entries.retain(|_, location| location.file != file);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
