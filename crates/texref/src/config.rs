//! Configuration for texref.
//!
//! Loads settings from `.texref.toml` in the workspace root, then applies
//! `TEXREF_*` environment variables on top.
//! Uses figment for layered configuration with provenance tracking.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the per-project configuration file.
pub const CONFIG_FILE_NAME: &str = ".texref.toml";

/// Default directories to exclude from scanning.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "_minted", "auto", "node_modules", "target"];

/// texref configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Extension whose presence marks the project root (default: "bib").
    #[serde(default = "default_marker_extension")]
    pub marker_extension: String,

    /// Extension of LaTeX sources scanned for labels and environments (default: "tex").
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Extension of bibliography files scanned for citation keys (default: "bib").
    #[serde(default = "default_bibliography_extension")]
    pub bibliography_extension: String,

    /// Additional directories to exclude from scanning (merged with defaults).
    #[serde(default)]
    pub exclude_dirs: Vec<String>,

    /// Whether to respect .gitignore files when scanning (default: true).
    #[serde(default = "default_respect_gitignore")]
    pub respect_gitignore: bool,

    /// Upper bound for a single directory walk in milliseconds (default: 2000).
    #[serde(default = "default_walk_timeout_ms")]
    pub walk_timeout_ms: u64,

    /// Maximum length of a bibliography title in annotations (default: 30).
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    /// Read bibliography records field by field for title/author annotations.
    /// When false, only citation keys are extracted (default: true).
    #[serde(default = "default_use_record_reader")]
    pub use_record_reader: bool,

    /// Editor filetypes served by the completer.
    #[serde(default = "default_filetypes")]
    pub filetypes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marker_extension: default_marker_extension(),
            source_extension: default_source_extension(),
            bibliography_extension: default_bibliography_extension(),
            exclude_dirs: Vec::new(),
            respect_gitignore: default_respect_gitignore(),
            walk_timeout_ms: default_walk_timeout_ms(),
            title_max_len: default_title_max_len(),
            use_record_reader: default_use_record_reader(),
            filetypes: default_filetypes(),
        }
    }
}

fn default_marker_extension() -> String {
    "bib".to_string()
}

fn default_source_extension() -> String {
    "tex".to_string()
}

fn default_bibliography_extension() -> String {
    "bib".to_string()
}

fn default_respect_gitignore() -> bool {
    true
}

fn default_walk_timeout_ms() -> u64 {
    2000
}

fn default_title_max_len() -> usize {
    30
}

fn default_use_record_reader() -> bool {
    true
}

fn default_filetypes() -> Vec<String> {
    vec!["plaintex".to_string(), "tex".to_string()]
}

impl Config {
    /// Load configuration from `.texref.toml` in the given root directory.
    ///
    /// Returns default config if the file doesn't exist.
    /// Reports parse errors with file, line, and key information.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);

        // Build layered config: defaults <- toml file <- environment
        let figment = Figment::from(Serialized::defaults(Config::default()));

        // Only add TOML provider if file exists
        let figment = if config_path.exists() {
            figment.merge(Toml::file(&config_path))
        } else {
            figment
        };
        let figment = figment.merge(Env::prefixed("TEXREF_"));

        match figment.extract() {
            Ok(config) => {
                if config_path.exists() {
                    tracing::info!("Loaded config from {:?}", config_path);
                }
                config
            }
            Err(e) => {
                tracing::warn!("Config error: {}", e);
                Self::default()
            }
        }
    }

    /// Get all directories to exclude (defaults + user-configured).
    pub fn excluded_dirs(&self) -> Vec<&str> {
        let mut dirs: Vec<&str> = DEFAULT_EXCLUDE_DIRS.to_vec();
        for dir in &self.exclude_dirs {
            if !dirs.contains(&dir.as_str()) {
                dirs.push(dir.as_str());
            }
        }
        dirs
    }

    pub fn walk_timeout(&self) -> Duration {
        Duration::from_millis(self.walk_timeout_ms)
    }
}
