//! Ignore rules applied during enumeration
//!
//! Supports two sources of exclusion patterns:
//! 1. Config-based patterns (gitignore syntax)
//! 2. The working directory's `.gitignore` (optional, disabled by default)
//!
//! Ignored directories are pruned from the walk, so nothing beneath them is
//! ever matched or watched.

use crate::error::{Result, WatchError};
use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ignore rule manager
///
/// Config patterns take precedence over `.gitignore`: a path ignored by
/// either source is skipped.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    /// Gitignore patterns (optional)
    gitignore: Option<Gitignore>,

    /// Patterns from configuration (optional)
    patterns: Option<Gitignore>,
}

impl IgnoreRules {
    /// Rules that ignore nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Load ignore rules anchored at `root`
    pub fn load(root: &Path, config: &IgnoreConfig) -> Result<Self> {
        let mut rules = Self::none();

        if config.use_gitignore {
            let gitignore_path = root.join(".gitignore");
            if gitignore_path.exists() {
                let mut builder = GitignoreBuilder::new(root);
                if let Some(err) = builder.add(&gitignore_path) {
                    return Err(ignore_failed(err));
                }
                rules.gitignore = Some(builder.build().map_err(ignore_failed)?);
            }
        }

        if !config.patterns.is_empty() {
            let mut builder = GitignoreBuilder::new(root);
            for pattern in &config.patterns {
                builder.add_line(None, pattern).map_err(ignore_failed)?;
            }
            rules.patterns = Some(builder.build().map_err(ignore_failed)?);
        }

        Ok(rules)
    }

    /// Check if path should be ignored
    pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
        if let Some(ref patterns) = self.patterns {
            if patterns.matched(path, is_dir).is_ignore() {
                return true;
            }
        }

        if let Some(ref gitignore) = self.gitignore {
            if gitignore.matched(path, is_dir).is_ignore() {
                return true;
            }
        }

        false
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        self.gitignore.is_some() as usize + self.patterns.is_some() as usize
    }
}

/// Ignore configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Also honour `<cwd>/.gitignore` (default: false)
    #[serde(default)]
    pub use_gitignore: bool,

    /// Additional gitignore-syntax patterns
    #[serde(default)]
    pub patterns: Vec<String>,
}

fn ignore_failed(err: ::ignore::Error) -> WatchError {
    WatchError::IgnoreFailed {
        reason: err.to_string(),
    }
}
