//! OS watch backends
//!
//! A backend hands out one [`WatchHandle`] per watched path and delivers
//! raw notifications as [`RawMessage`]s on a channel, so the engine never
//! runs inside a backend callback.

pub mod memory;
mod native;

pub use memory::MemoryBackend;
pub use native::NotifyBackend;

use crate::error::{Result, WatchError};
use crate::PathKind;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Raw notification type, as coarse as the OS reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// Content or metadata changed
    Change,
    /// The path appeared, disappeared or was renamed
    Rename,
}

/// A raw notification for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: RawKind,
}

impl RawEvent {
    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: RawKind::Change,
        }
    }

    pub fn rename(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: RawKind::Rename,
        }
    }
}

/// Everything a backend can deliver
#[derive(Debug)]
pub enum RawMessage {
    Event(RawEvent),
    /// The backend lost events (queue overflow); every watched directory
    /// has to be reconciled.
    Rescan,
    Error(WatchError),
}

pub type RawSender = mpsc::UnboundedSender<RawMessage>;
pub type RawReceiver = mpsc::UnboundedReceiver<RawMessage>;

/// Opaque, exclusively owned subscription for one path.
///
/// Not `Clone`: the registry entry that holds it is the only owner, and
/// giving it back to [`WatchBackend::unwatch`] consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    id: u64,
    path: PathBuf,
}

impl WatchHandle {
    pub fn new(id: u64, path: PathBuf) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Low-level notification primitive
pub trait WatchBackend: Send + 'static {
    /// Start delivering raw notifications for `path`
    fn watch(&mut self, path: &Path, kind: PathKind) -> Result<WatchHandle>;

    /// Stop delivering notifications for the handle's path
    fn unwatch(&mut self, handle: WatchHandle) -> Result<()>;
}
