//! Directory walking for extractor roots.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::root::has_extension;

/// Options for a single walk, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub exclude_dirs: Vec<String>,
    pub respect_gitignore: bool,
    pub timeout: Duration,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl WalkOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclude_dirs: config
                .excluded_dirs()
                .into_iter()
                .map(str::to_string)
                .collect(),
            respect_gitignore: config.respect_gitignore,
            timeout: config.walk_timeout(),
        }
    }
}

/// Result of [`find_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkedFiles {
    /// Matching files in walk order
    pub files: Vec<PathBuf>,
    /// False when the timeout cut the walk short
    pub complete: bool,
}

/// Find all files under `root` ending in `.<extension>`, in walk order.
///
/// Respects .gitignore files (when enabled), skips hidden entries and the
/// configured exclusions. A `root` that is not a directory yields nothing.
/// Once `options.timeout` elapses the walk stops and returns what it found,
/// marked incomplete.
pub fn find_files(root: &Path, extension: &str, options: &WalkOptions) -> WalkedFiles {
    use ignore::overrides::OverrideBuilder;
    use ignore::WalkBuilder;

    let mut files = Vec::new();
    if !root.is_dir() {
        return WalkedFiles {
            files,
            complete: true,
        };
    }

    // Build overrides for custom exclusions (these take precedence)
    let mut override_builder = OverrideBuilder::new(root);
    for dir in &options.exclude_dirs {
        let pattern = format!("!{}/", dir);
        if let Err(e) = override_builder.add(&pattern) {
            tracing::warn!("Invalid exclude pattern '{}': {}", pattern, e);
        }
    }
    let overrides = match override_builder.build() {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!("Failed to build overrides: {}", e);
            ignore::overrides::Override::empty()
        }
    };

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .require_git(false)
        .ignore(options.respect_gitignore)
        .parents(options.respect_gitignore)
        .overrides(overrides);

    let deadline = Instant::now() + options.timeout;
    let mut complete = true;
    for entry in builder.build() {
        if Instant::now() >= deadline {
            complete = false;
            tracing::warn!(
                "Walk of {:?} exceeded {:?}, returning {} files found so far",
                root,
                options.timeout,
                files.len()
            );
            break;
        }
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && has_extension(path, extension) {
                    files.push(path.to_path_buf());
                }
            }
            Err(err) => {
                tracing::warn!("Error walking directory: {}", err);
            }
        }
    }

    WalkedFiles { files, complete }
}
