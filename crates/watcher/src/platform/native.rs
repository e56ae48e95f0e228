//! `notify`-backed watch primitive

use super::{RawEvent, RawKind, RawMessage, RawReceiver, RawSender, WatchBackend, WatchHandle};
use crate::error::{Result, WatchError};
use crate::PathKind;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;

/// One `notify::RecommendedWatcher` shared by every handle.
///
/// Each path is registered non-recursively; directories report changes to
/// their immediate children, which the engine routes to reconciliation.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    next_id: u64,
}

impl NotifyBackend {
    /// Create the backend and the channel its notifications arrive on
    pub fn new() -> Result<(Self, RawReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward(&tx, res);
        })?;

        Ok((Self { watcher, next_id: 0 }, rx))
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Path, _kind: PathKind) -> Result<WatchHandle> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        self.next_id += 1;
        Ok(WatchHandle::new(self.next_id, path.to_path_buf()))
    }

    fn unwatch(&mut self, handle: WatchHandle) -> Result<()> {
        match self.watcher.unwatch(handle.path()) {
            Ok(()) => Ok(()),
            // The OS already dropped the watch along with the deleted path
            Err(notify::Error {
                kind: notify::ErrorKind::WatchNotFound,
                ..
            }) => Ok(()),
            Err(e) => Err(WatchError::PathWatchFailed {
                path: handle.path().to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Map a notify event kind onto the coarse change/rename split
pub(crate) fn classify(kind: &EventKind) -> Option<RawKind> {
    match kind {
        EventKind::Access(_) => None,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some(RawKind::Rename)
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(RawKind::Change),
    }
}

fn forward(tx: &RawSender, res: notify::Result<Event>) {
    // Send failures mean the engine is gone; nothing left to notify.
    match res {
        Ok(event) => {
            if event.need_rescan() {
                let _ = tx.send(RawMessage::Rescan);
                return;
            }
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                let _ = tx.send(RawMessage::Event(RawEvent { path, kind }));
            }
        }
        Err(e) => {
            let _ = tx.send(RawMessage::Error(WatchError::EventError {
                details: e.to_string(),
            }));
        }
    }
}
