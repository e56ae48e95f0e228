//! Watcher options
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! cwd = "/srv/site"
//! persistent = true
//! debounce_ms = 50
//! depth = 4
//! rescan_interval_ms = 30000
//!
//! [ignore]
//! use_gitignore = true
//! patterns = ["target/", "*.swp"]
//! ```

use crate::debounce::DEFAULT_DEBOUNCE_MS;
use crate::error::{Result, WatchError};
use crate::ignore::IgnoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for the debounce window
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Upper bound for the periodic rescan interval
pub const MAX_RESCAN_INTERVAL_MS: u64 = 86_400_000;

/// Options accepted by [`crate::Watcher`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Base directory for the pattern (default: process working directory)
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Keep watching after the `Watcher` handle is dropped (default: true)
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Quiet period before a burst of notifications becomes one event
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum depth below `cwd` (default: unlimited)
    #[serde(default)]
    pub depth: Option<usize>,

    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Re-list every watched directory on this interval (default: never)
    #[serde(default)]
    pub rescan_interval_ms: Option<u64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            persistent: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            depth: None,
            ignore: IgnoreConfig::default(),
            rescan_interval_ms: None,
        }
    }
}

impl WatchOptions {
    /// Parse options from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text).map_err(|e| WatchError::ConfigError {
            reason: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| WatchError::ConfigError {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges: `debounce_ms` 0-60,000 and `rescan_interval_ms`
    /// 1-86,400,000 (one day)
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(WatchError::ConfigError {
                reason: format!(
                    "debounce_ms must be at most {MAX_DEBOUNCE_MS}, got {}",
                    self.debounce_ms
                ),
            });
        }
        if let Some(interval_ms) = self.rescan_interval_ms {
            if interval_ms == 0 || interval_ms > MAX_RESCAN_INTERVAL_MS {
                return Err(WatchError::ConfigError {
                    reason: format!(
                        "rescan_interval_ms must be between 1 and {MAX_RESCAN_INTERVAL_MS}, got {interval_ms}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Absolute, canonical working directory
    pub fn resolved_cwd(&self) -> Result<PathBuf> {
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().map_err(|e| WatchError::InvalidCwd {
                path: PathBuf::from("."),
                reason: e.to_string(),
            })?,
        };

        let canonical = cwd.canonicalize().map_err(|e| WatchError::InvalidCwd {
            path: cwd.clone(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(WatchError::InvalidCwd {
                path: cwd,
                reason: "not a directory".to_string(),
            });
        }
        Ok(canonical)
    }
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
