//! Glob-driven recursive file system watching
//!
//! This crate provides a watcher that:
//! - Enumerates every path under a working directory matching a glob pattern
//! - Holds one OS watch handle per matched file and directory
//! - Re-lists directories on change and diffs them against a live registry
//! - Coalesces bursts of raw notifications into one logical event per path
//!
//! ```no_run
//! # async fn demo() -> watcher::Result<()> {
//! let (mut watcher, mut events) = watcher::Watcher::builder("**/*")
//!     .cwd("/tmp/project")
//!     .spawn()?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} {:?}", event.name(), event.path());
//! }
//! watcher.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod emitter;
pub mod error;
pub mod ignore;
pub mod lister;
pub mod platform;
pub mod reconcile;
pub mod registry;
pub mod resolve;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use config::WatchOptions;
pub use emitter::{Emitter, EventStream};
pub use error::{Result, WatchError};
pub use crate::ignore::IgnoreConfig;
pub use lister::{DirectoryLister, GlobLister, ListedPath, Pattern};
pub use platform::{RawEvent, RawKind, RawMessage, WatchBackend, WatchHandle};
pub use registry::WatchRegistry;
pub use watcher::{Watcher, WatcherBuilder};

/// Whether a watched path is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    File,
    Directory,
}

/// Registry contents at a point in time, sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSnapshot {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

/// Normalized watcher event
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// File discovered (initial scan or later)
    Add { path: PathBuf },
    /// Directory discovered, including the root
    AddDir { path: PathBuf },
    /// Watched file modified (debounced)
    Change { path: PathBuf },
    /// Watched file removed
    Unlink { path: PathBuf },
    /// Watched directory removed
    UnlinkDir { path: PathBuf },
    /// Initial scan finished and the root is watched. Fires once.
    Ready(WatchSnapshot),
    /// Enumeration or watch failure. The watcher keeps running.
    Error(Arc<WatchError>),
}

impl WatchEvent {
    /// Event name as used on the wire (`add`, `addDir`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            WatchEvent::Add { .. } => "add",
            WatchEvent::AddDir { .. } => "addDir",
            WatchEvent::Change { .. } => "change",
            WatchEvent::Unlink { .. } => "unlink",
            WatchEvent::UnlinkDir { .. } => "unlinkDir",
            WatchEvent::Ready(_) => "ready",
            WatchEvent::Error(_) => "error",
        }
    }

    /// Path carried by path events, `None` for `ready` and `error`
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Add { path }
            | WatchEvent::AddDir { path }
            | WatchEvent::Change { path }
            | WatchEvent::Unlink { path }
            | WatchEvent::UnlinkDir { path } => Some(path),
            WatchEvent::Ready(_) | WatchEvent::Error(_) => None,
        }
    }

    pub(crate) fn error(err: WatchError) -> Self {
        WatchEvent::Error(Arc::new(err))
    }
}
