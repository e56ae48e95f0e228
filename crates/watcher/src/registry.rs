//! Watch registry
//!
//! The single source of truth for "is this path watched". Owns every
//! [`WatchHandle`] and is the only place handles are created or closed.
//! Files and directories live in separate maps with disjoint keys.

use crate::emitter::Emitter;
use crate::platform::{WatchBackend, WatchHandle};
use crate::{PathKind, WatchEvent, WatchSnapshot};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One watched path and the handle that keeps it watched
#[derive(Debug)]
pub struct WatchedPath {
    pub path: PathBuf,
    pub kind: PathKind,
    handle: WatchHandle,
}

impl WatchedPath {
    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }
}

pub struct WatchRegistry<B: WatchBackend> {
    backend: B,
    files: HashMap<PathBuf, WatchedPath>,
    dirs: HashMap<PathBuf, WatchedPath>,
}

impl<B: WatchBackend> WatchRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            files: HashMap::new(),
            dirs: HashMap::new(),
        }
    }

    /// Watch a file and emit `add`. Returns false if nothing was registered.
    pub fn watch_file(&mut self, path: &Path, emitter: &Emitter) -> bool {
        self.watch(path, PathKind::File, emitter)
    }

    /// Watch a directory and emit `addDir`. Returns false if nothing was
    /// registered.
    pub fn watch_dir(&mut self, path: &Path, emitter: &Emitter) -> bool {
        self.watch(path, PathKind::Directory, emitter)
    }

    fn watch(&mut self, path: &Path, kind: PathKind, emitter: &Emitter) -> bool {
        if self.contains(path) {
            debug!("[registry] already watching {}", path.display());
            return false;
        }

        let handle = match self.backend.watch(path, kind) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("[registry] failed to watch {}: {e}", path.display());
                emitter.emit(WatchEvent::error(e));
                return false;
            }
        };

        let entry = WatchedPath {
            path: path.to_path_buf(),
            kind,
            handle,
        };
        let event = match kind {
            PathKind::File => {
                self.files.insert(path.to_path_buf(), entry);
                WatchEvent::Add {
                    path: path.to_path_buf(),
                }
            }
            PathKind::Directory => {
                self.dirs.insert(path.to_path_buf(), entry);
                WatchEvent::AddDir {
                    path: path.to_path_buf(),
                }
            }
        };
        emitter.emit(event);
        true
    }

    /// Stop watching a file and emit `unlink`. Unknown paths are a no-op.
    pub fn remove_file(&mut self, path: &Path, emitter: &Emitter) -> bool {
        let Some(entry) = self.files.remove(path) else {
            return false;
        };
        self.close_handle(entry);
        emitter.emit(WatchEvent::Unlink {
            path: path.to_path_buf(),
        });
        true
    }

    /// Stop watching a directory and everything registered beneath it.
    ///
    /// Descendants go deepest first (`unlink` for files, `unlinkDir` for
    /// directories), then the directory itself emits `unlinkDir`. Returns
    /// every removed path; empty if `path` was not a watched directory.
    pub fn remove_dir(&mut self, path: &Path, emitter: &Emitter) -> Vec<PathBuf> {
        if !self.dirs.contains_key(path) {
            return Vec::new();
        }
        self.remove_tree(path, emitter)
    }

    fn remove_tree(&mut self, path: &Path, emitter: &Emitter) -> Vec<PathBuf> {
        let mut doomed: Vec<(PathBuf, PathKind)> = self
            .files
            .keys()
            .map(|p| (p.clone(), PathKind::File))
            .chain(self.dirs.keys().map(|p| (p.clone(), PathKind::Directory)))
            .filter(|(p, _)| p.starts_with(path))
            .collect();
        // Deepest first; at equal depth files before directories, then by name
        doomed.sort_by(|(a, ak), (b, bk)| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| (*ak == PathKind::Directory).cmp(&(*bk == PathKind::Directory)))
                .then_with(|| a.cmp(b))
        });

        let mut removed = Vec::with_capacity(doomed.len());
        for (doomed_path, kind) in doomed {
            let map = match kind {
                PathKind::File => &mut self.files,
                PathKind::Directory => &mut self.dirs,
            };
            if let Some(entry) = map.remove(&doomed_path) {
                self.close_handle(entry);
                emitter.emit(removal_event(&doomed_path, kind));
                removed.push(doomed_path);
            }
        }

        removed
    }

    /// Replace the handle of a watched path that was swapped out on disk
    /// (atomic rename of a file, directory deleted and recreated). The old
    /// handle is bound to the old inode and would never report again.
    ///
    /// Emits nothing unless the new watch fails. Then `error` is emitted and
    /// the path leaves the registry as if removed: `unlink` for a file, the
    /// usual cascade ending in `unlinkDir` for a directory.
    pub fn rearm(&mut self, path: &Path, emitter: &Emitter) -> bool {
        let (entry, kind) = if let Some(entry) = self.files.remove(path) {
            (entry, PathKind::File)
        } else if let Some(entry) = self.dirs.remove(path) {
            (entry, PathKind::Directory)
        } else {
            return false;
        };
        // Close first: the backend keys watches by path
        self.close_handle(entry);

        match self.backend.watch(path, kind) {
            Ok(handle) => {
                let entry = WatchedPath {
                    path: path.to_path_buf(),
                    kind,
                    handle,
                };
                match kind {
                    PathKind::File => self.files.insert(path.to_path_buf(), entry),
                    PathKind::Directory => self.dirs.insert(path.to_path_buf(), entry),
                };
                true
            }
            Err(e) => {
                warn!("[registry] failed to re-watch {}: {e}", path.display());
                emitter.emit(WatchEvent::error(e));
                if kind == PathKind::Directory {
                    self.remove_tree(path, emitter);
                }
                emitter.emit(removal_event(path, kind));
                false
            }
        }
    }

    /// Close every handle and forget every path. Emits nothing; calling it
    /// again is a no-op.
    pub fn close_all(&mut self) -> usize {
        let entries: Vec<WatchedPath> = self
            .files
            .drain()
            .chain(self.dirs.drain())
            .map(|(_, entry)| entry)
            .collect();

        let count = entries.len();
        for entry in entries {
            self.close_handle(entry);
        }
        count
    }

    fn close_handle(&mut self, entry: WatchedPath) {
        if let Err(e) = self.backend.unwatch(entry.handle) {
            debug!("[registry] unwatch {} failed: {e}", entry.path.display());
        }
    }

    pub fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    pub fn get(&self, path: &Path) -> Option<&WatchedPath> {
        self.files.get(path).or_else(|| self.dirs.get(path))
    }

    /// Registered files whose parent is `dir`
    pub fn files_in(&self, dir: &Path) -> Vec<PathBuf> {
        Self::children(&self.files, dir)
    }

    /// Registered directories whose parent is `dir`
    pub fn dirs_in(&self, dir: &Path) -> Vec<PathBuf> {
        Self::children(&self.dirs, dir)
    }

    fn children(map: &HashMap<PathBuf, WatchedPath>, dir: &Path) -> Vec<PathBuf> {
        let mut children: Vec<PathBuf> = map
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        children.sort();
        children
    }

    /// Watched directories, shallowest first
    pub fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.dirs.keys().cloned().collect();
        dirs.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });
        dirs
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    pub fn snapshot(&self) -> WatchSnapshot {
        let mut files: Vec<PathBuf> = self.files.keys().cloned().collect();
        let mut dirs: Vec<PathBuf> = self.dirs.keys().cloned().collect();
        files.sort();
        dirs.sort();
        WatchSnapshot { files, dirs }
    }
}

fn removal_event(path: &Path, kind: PathKind) -> WatchEvent {
    let path = path.to_path_buf();
    match kind {
        PathKind::File => WatchEvent::Unlink { path },
        PathKind::Directory => WatchEvent::UnlinkDir { path },
    }
}
