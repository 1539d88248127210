//! Ignore pattern management
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (editor/OS temp files, the persisted baseline - always active)
//! 2. .vwignore patterns (monitor-specific, optional)
//! 3. .gitignore patterns (optional, disabled by default)
//! 4. Config-based patterns (additional custom patterns)

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use veriwatch_core::RelPath;

/// Name of the monitor-specific ignore file in the watch root
pub const IGNORE_FILE_NAME: &str = ".vwignore";

/// Ignore rule manager
///
/// Combines multiple sources of ignore patterns with proper precedence:
/// 1. Built-in patterns (highest priority - always enforced)
/// 2. .vwignore patterns (a `!pattern` here re-includes what .gitignore drops)
/// 3. .gitignore patterns
/// 4. Additional config patterns
pub struct IgnoreRules {
    /// Watch root directory
    root: PathBuf,

    /// Monitor-specific ignore patterns (optional)
    vwignore: Option<Gitignore>,

    /// Gitignore patterns (optional)
    gitignore: Option<Gitignore>,

    /// Patterns from configuration
    additional: Option<Gitignore>,

    /// Persisted baseline, when it lives inside the root
    state_file: Option<RelPath>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a watch root
    ///
    /// `state_file` is the persisted baseline location; it is never
    /// monitored when it lies under `root`.
    pub fn load(
        root: &Path,
        config: IgnoreConfig,
        state_file: Option<&Path>,
    ) -> Result<Self, ignore::Error> {
        let state_file = state_file.and_then(|path| RelPath::from_absolute(root, path).ok());

        let additional = if config.additional_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(root);
            for pattern in &config.additional_patterns {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        let mut rules = Self {
            root: root.to_path_buf(),
            vwignore: None,
            gitignore: None,
            additional,
            state_file,
            config,
        };

        rules.reload_ignore_files()?;
        Ok(rules)
    }

    /// Rules with only the built-ins active
    pub fn builtin(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            vwignore: None,
            gitignore: None,
            additional: None,
            state_file: None,
            config: IgnoreConfig {
                use_gitignore: false,
                use_vwignore: false,
                additional_patterns: vec![],
            },
        }
    }

    /// Reload ignore files from disk
    ///
    /// This can be called to pick up changes to .gitignore/.vwignore
    pub fn reload_ignore_files(&mut self) -> Result<(), ignore::Error> {
        self.vwignore = if self.config.use_vwignore {
            self.build_from_file(IGNORE_FILE_NAME)?
        } else {
            None
        };
        self.gitignore = if self.config.use_gitignore {
            self.build_from_file(".gitignore")?
        } else {
            None
        };
        Ok(())
    }

    fn build_from_file(&self, name: &str) -> Result<Option<Gitignore>, ignore::Error> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let mut builder = GitignoreBuilder::new(&self.root);
        if let Some(err) = builder.add(&path) {
            return Err(err);
        }
        builder.build().map(Some)
    }

    /// Check if path should be ignored
    ///
    /// Looks at the filesystem to tell directories from files.
    pub fn should_ignore(&self, path: &RelPath) -> bool {
        let is_dir = path.to_path(&self.root).is_dir();
        self.should_ignore_entry(path, is_dir)
    }

    /// Check a path whose type is already known (tree walks)
    pub fn should_ignore_entry(&self, path: &RelPath, is_dir: bool) -> bool {
        // 1. Built-in patterns (highest priority - always enforced)
        if self.is_builtin_ignored(path) {
            return true;
        }

        let candidate = Path::new(path.as_str());

        // 2. .vwignore (overrides .gitignore in both directions)
        if let Some(ref vwignore) = self.vwignore {
            match vwignore.matched_path_or_any_parents(candidate, is_dir) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }

        // 3. .gitignore
        if let Some(ref gitignore) = self.gitignore {
            if gitignore
                .matched_path_or_any_parents(candidate, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        // 4. Additional config patterns
        if let Some(ref additional) = self.additional {
            if additional
                .matched_path_or_any_parents(candidate, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        false
    }

    /// Check if path matches built-in ignore patterns
    ///
    /// These are always enforced regardless of configuration
    fn is_builtin_ignored(&self, path: &RelPath) -> bool {
        if self.state_file.as_ref() == Some(path) {
            return true;
        }
        matches_temp_file(path.file_name())
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 1; // Built-in always active
        if self.vwignore.is_some() {
            count += 1;
        }
        if self.gitignore.is_some() {
            count += 1;
        }
        if self.additional.is_some() {
            count += 1;
        }
        count
    }

    /// Get watch root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Editor swap/backup files, OS metadata files and partial writes
///
/// `*.tmp` also covers the baseline's own atomic-write temp files.
fn matches_temp_file(filename: &str) -> bool {
    // Vim swap files (.swp, .swo, .swn, .swx)
    if filename.ends_with(".swp")
        || filename.ends_with(".swo")
        || filename.ends_with(".swn")
        || filename.ends_with(".swx")
    {
        return true;
    }

    // Vim/Emacs backup files (~)
    if filename.ends_with('~') {
        return true;
    }

    // Emacs auto-save files (#*#)
    if filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#') {
        return true;
    }

    // Emacs lock files (.#*)
    if filename.starts_with(".#") {
        return true;
    }

    // MacOS system files
    if filename == ".DS_Store" || filename.starts_with("._") {
        return true;
    }

    // Windows system files
    if filename == "Thumbs.db" || filename == "desktop.ini" {
        return true;
    }

    // Partial writes and downloads
    filename.ends_with(".tmp") || filename.ends_with(".part") || filename.ends_with(".crdownload")
}

/// Ignore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: false)
    #[serde(default)]
    pub use_gitignore: bool,

    /// Use .vwignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_vwignore: bool,

    /// Additional patterns from config (gitignore syntax)
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: false,
            use_vwignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}
