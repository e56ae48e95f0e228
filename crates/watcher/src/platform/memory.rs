//! In-memory backend
//!
//! Hands out handles without touching the OS and lets the caller inject raw
//! notifications. Clones share state, so a test can keep one clone to
//! inspect open handles while the engine owns another.

use super::{RawEvent, RawMessage, RawReceiver, RawSender, WatchBackend, WatchHandle};
use crate::error::{Result, WatchError};
use crate::PathKind;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    tx: RawSender,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    open: HashMap<u64, PathBuf>,
    failing: HashSet<PathBuf>,
    opened_total: usize,
}

impl MemoryBackend {
    pub fn new() -> (Self, RawReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            tx,
        };
        (backend, rx)
    }

    /// Make future `watch` calls for `path` fail
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.state.lock().failing.insert(path.into());
    }

    /// Inject a raw notification
    pub fn notify(&self, event: RawEvent) {
        let _ = self.tx.send(RawMessage::Event(event));
    }

    /// Inject an overflow notification
    pub fn request_rescan(&self) {
        let _ = self.tx.send(RawMessage::Rescan);
    }

    /// Inject a backend error
    pub fn fail(&self, details: &str) {
        let _ = self.tx.send(RawMessage::Error(WatchError::EventError {
            details: details.to_string(),
        }));
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.state.lock().open.values().any(|p| p == path)
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Total handles ever created, including closed ones
    pub fn opened_total(&self) -> usize {
        self.state.lock().opened_total
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.lock().open.values().cloned().collect();
        paths.sort();
        paths
    }
}

impl WatchBackend for MemoryBackend {
    fn watch(&mut self, path: &Path, _kind: PathKind) -> Result<WatchHandle> {
        let mut state = self.state.lock();
        if state.failing.contains(path) {
            return Err(WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: "permission denied".to_string(),
            });
        }

        state.next_id += 1;
        state.opened_total += 1;
        let id = state.next_id;
        state.open.insert(id, path.to_path_buf());
        Ok(WatchHandle::new(id, path.to_path_buf()))
    }

    fn unwatch(&mut self, handle: WatchHandle) -> Result<()> {
        self.state.lock().open.remove(&handle.id());
        Ok(())
    }
}
