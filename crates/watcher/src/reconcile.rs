//! Directory reconciliation
//!
//! Re-lists a directory and diffs the listing against the registry. The
//! listing is the truth: registered children missing from it are removed,
//! listed paths missing from the registry are watched. The same diff also
//! drives the initial scan and the periodic rescan, so an unchanged tree
//! always yields an empty diff.

use crate::emitter::Emitter;
use crate::lister::{DirectoryLister, ListedPath};
use crate::platform::WatchBackend;
use crate::registry::WatchRegistry;
use crate::{PathKind, WatchEvent, WatchSnapshot};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Difference between a directory listing and the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirDiff {
    /// Listed but not registered (with the listing's classification)
    pub added: Vec<ListedPath>,
    /// Registered files that are no longer listed as files
    pub removed_files: Vec<PathBuf>,
    /// Registered directories that are no longer listed as directories
    pub removed_dirs: Vec<PathBuf>,
}

impl DirDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed_files.is_empty() && self.removed_dirs.is_empty()
    }
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub diff: DirDiff,
    /// Every path that left the registry, cascades included
    pub removed: Vec<PathBuf>,
}

/// Diff the immediate children of `dir` against the registry
pub fn diff_listing<B: WatchBackend>(
    registry: &WatchRegistry<B>,
    dir: &Path,
    listed: &[ListedPath],
) -> DirDiff {
    let listed_set: HashSet<(&Path, PathKind)> =
        listed.iter().map(|p| (p.path.as_path(), p.kind)).collect();

    let removed_files = registry
        .files_in(dir)
        .into_iter()
        .filter(|p| !listed_set.contains(&(p.as_path(), PathKind::File)))
        .collect();

    let removed_dirs = registry
        .dirs_in(dir)
        .into_iter()
        .filter(|p| !listed_set.contains(&(p.as_path(), PathKind::Directory)))
        .collect();

    let added = listed
        .iter()
        .filter(|p| match p.kind {
            PathKind::File => !registry.is_file(&p.path),
            PathKind::Directory => !registry.is_dir(&p.path),
        })
        .cloned()
        .collect();

    DirDiff {
        added,
        removed_files,
        removed_dirs,
    }
}

/// Reconciliation engine.
///
/// Holds no watch state of its own; the registry is passed in on every call.
#[derive(Clone)]
pub struct Reconciler {
    lister: Arc<dyn DirectoryLister>,
}

impl Reconciler {
    pub fn new(lister: Arc<dyn DirectoryLister>) -> Self {
        Self { lister }
    }

    /// Register the root and everything matching beneath it.
    ///
    /// The root is watched first so the parent-before-child order holds for
    /// the whole tree. An enumeration failure is reported and whatever was
    /// registered so far is kept.
    pub async fn initial_scan<B: WatchBackend>(
        &self,
        root: &Path,
        registry: &mut WatchRegistry<B>,
        emitter: &Emitter,
    ) -> WatchSnapshot {
        registry.watch_dir(root, emitter);

        match self.lister.scan(root).await {
            Ok(entries) => {
                for entry in &entries {
                    watch_listed(entry, registry, emitter);
                }
            }
            Err(e) => {
                warn!("[reconcile] initial scan of {} failed: {e}", root.display());
                emitter.emit(WatchEvent::error(e));
            }
        }

        let snapshot = registry.snapshot();
        info!(
            "[reconcile] initial scan: {} files in {} directories",
            snapshot.files.len(),
            snapshot.dirs.len()
        );
        snapshot
    }

    /// Re-list `dir` and apply the diff.
    ///
    /// Returns `None` when `dir` is not a watched directory or the listing
    /// failed (reported as `error`; the next notification retries).
    pub async fn reconcile_dir<B: WatchBackend>(
        &self,
        dir: &Path,
        registry: &mut WatchRegistry<B>,
        emitter: &Emitter,
    ) -> Option<Outcome> {
        if !registry.is_dir(dir) {
            return None;
        }

        if kind_on_disk(dir) != Some(PathKind::Directory) {
            debug!("[reconcile] {} vanished", dir.display());
            let removed = registry.remove_dir(dir, emitter);
            return Some(Outcome {
                diff: DirDiff {
                    removed_dirs: vec![dir.to_path_buf()],
                    ..DirDiff::default()
                },
                removed,
            });
        }

        let listed = match self.lister.list(dir).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("[reconcile] listing {} failed: {e}", dir.display());
                emitter.emit(WatchEvent::error(e));
                return None;
            }
        };

        let diff = diff_listing(registry, dir, &listed);
        if diff.is_empty() {
            debug!("[reconcile] {} unchanged", dir.display());
            return Some(Outcome {
                diff,
                removed: Vec::new(),
            });
        }

        debug!(
            "[reconcile] {}: +{} -{} files -{} dirs",
            dir.display(),
            diff.added.len(),
            diff.removed_files.len(),
            diff.removed_dirs.len()
        );

        // Removals first so a path that changed kind leaves the other map
        // before it is added back.
        let mut removed = Vec::new();
        for path in &diff.removed_files {
            if registry.remove_file(path, emitter) {
                removed.push(path.clone());
            }
        }
        for path in &diff.removed_dirs {
            removed.extend(registry.remove_dir(path, emitter));
        }

        for entry in &diff.added {
            let watched = watch_listed(entry, registry, emitter);
            if watched && entry.kind == PathKind::Directory {
                self.adopt_tree(&entry.path, registry, emitter).await;
            }
        }

        Some(Outcome { diff, removed })
    }

    /// Register everything beneath a directory that just appeared, so files
    /// created together with it are not missed.
    async fn adopt_tree<B: WatchBackend>(
        &self,
        dir: &Path,
        registry: &mut WatchRegistry<B>,
        emitter: &Emitter,
    ) {
        match self.lister.scan(dir).await {
            Ok(entries) => {
                for entry in &entries {
                    watch_listed(entry, registry, emitter);
                }
            }
            Err(e) => {
                warn!("[reconcile] scanning new directory {} failed: {e}", dir.display());
                emitter.emit(WatchEvent::error(e));
            }
        }
    }
}

fn watch_listed<B: WatchBackend>(
    entry: &ListedPath,
    registry: &mut WatchRegistry<B>,
    emitter: &Emitter,
) -> bool {
    if registry.contains(&entry.path) {
        return false;
    }
    match entry.kind {
        PathKind::File => registry.watch_file(&entry.path, emitter),
        PathKind::Directory => registry.watch_dir(&entry.path, emitter),
    }
}

/// What is at `path` right now, without following symlinks. A symlink
/// counts as a file, the same way enumeration classifies it.
pub(crate) fn kind_on_disk(path: &Path) -> Option<PathKind> {
    let metadata = std::fs::symlink_metadata(path).ok()?;
    if metadata.is_dir() {
        Some(PathKind::Directory)
    } else {
        Some(PathKind::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EventStream;
    use crate::error::{Result, WatchError};
    use crate::ignore::IgnoreRules;
    use crate::lister::{GlobLister, Pattern};
    use crate::platform::MemoryBackend;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        root: PathBuf,
        registry: WatchRegistry<MemoryBackend>,
        observer: MemoryBackend,
        emitter: Emitter,
        stream: EventStream,
        reconciler: Reconciler,
    }

    fn fixture(pattern: &str) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("bananas")).unwrap();
        fs::create_dir_all(root.join("oranges")).unwrap();
        fs::write(root.join("one.txt"), b"1").unwrap();
        fs::write(root.join("bananas/two.txt"), b"2").unwrap();
        fs::write(root.join("bananas/three.txt"), b"3").unwrap();
        fs::write(root.join("oranges/four.txt"), b"4").unwrap();

        let lister = GlobLister::new(
            root.clone(),
            Pattern::new(pattern).unwrap(),
            IgnoreRules::none(),
            None,
        );
        let (backend, _rx) = MemoryBackend::new();
        let observer = backend.clone();
        let (emitter, stream) = Emitter::channel();

        Fixture {
            temp_dir,
            root,
            registry: WatchRegistry::new(backend),
            observer,
            emitter,
            stream,
            reconciler: Reconciler::new(Arc::new(lister)),
        }
    }

    fn drain(stream: &mut EventStream) -> Vec<(String, PathBuf)> {
        let mut events = Vec::new();
        while let Some(event) = stream.try_recv() {
            let path = event.path().map(Path::to_path_buf).unwrap_or_default();
            events.push((event.name().to_string(), path));
        }
        events
    }

    #[tokio::test]
    async fn test_initial_scan_registers_whole_tree() {
        let mut f = fixture("**/*");

        let snapshot = f
            .reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;

        assert_eq!(
            snapshot.dirs,
            vec![f.root.clone(), f.root.join("bananas"), f.root.join("oranges")]
        );
        assert_eq!(
            snapshot.files,
            vec![
                f.root.join("bananas/three.txt"),
                f.root.join("bananas/two.txt"),
                f.root.join("one.txt"),
                f.root.join("oranges/four.txt"),
            ]
        );
        assert_eq!(f.observer.open_count(), 7);

        // Root is announced before anything beneath it
        let events = drain(&mut f.stream);
        assert_eq!(events[0], ("addDir".to_string(), f.root.clone()));
        assert_eq!(events.len(), 7);
    }

    #[tokio::test]
    async fn test_unchanged_tree_yields_empty_diffs() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        for dir in f.registry.dirs() {
            let outcome = f
                .reconciler
                .reconcile_dir(&dir, &mut f.registry, &f.emitter)
                .await
                .unwrap();
            assert!(outcome.diff.is_empty(), "{} produced {:?}", dir.display(), outcome.diff);
        }
        assert!(drain(&mut f.stream).is_empty());
        assert_eq!(f.observer.opened_total(), 7);
    }

    #[tokio::test]
    async fn test_reconcile_detects_added_and_removed_files() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        let bananas = f.root.join("bananas");
        fs::remove_file(bananas.join("two.txt")).unwrap();
        fs::write(bananas.join("five.txt"), b"5").unwrap();

        let outcome = f
            .reconciler
            .reconcile_dir(&bananas, &mut f.registry, &f.emitter)
            .await
            .unwrap();

        assert_eq!(outcome.diff.added, vec![ListedPath::file(bananas.join("five.txt"))]);
        assert_eq!(outcome.diff.removed_files, vec![bananas.join("two.txt")]);
        assert_eq!(outcome.removed, vec![bananas.join("two.txt")]);
        assert_eq!(
            drain(&mut f.stream),
            vec![
                ("unlink".to_string(), bananas.join("two.txt")),
                ("add".to_string(), bananas.join("five.txt")),
            ]
        );
        assert!(!f.observer.is_watching(&bananas.join("two.txt")));

        // The removed file is not re-added by a later pass
        let again = f
            .reconciler
            .reconcile_dir(&bananas, &mut f.registry, &f.emitter)
            .await
            .unwrap();
        assert!(again.diff.is_empty());
    }

    #[tokio::test]
    async fn test_new_directory_is_adopted_with_contents() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        fs::create_dir_all(f.root.join("kiwi/slices")).unwrap();
        fs::write(f.root.join("kiwi/seven.txt"), b"7").unwrap();

        f.reconciler
            .reconcile_dir(&f.root, &mut f.registry, &f.emitter)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut f.stream),
            vec![
                ("addDir".to_string(), f.root.join("kiwi")),
                ("add".to_string(), f.root.join("kiwi/seven.txt")),
                ("addDir".to_string(), f.root.join("kiwi/slices")),
            ]
        );
        assert!(f.registry.is_file(&f.root.join("kiwi/seven.txt")));
    }

    #[tokio::test]
    async fn test_removed_directory_cascades() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        let oranges = f.root.join("oranges");
        fs::remove_dir_all(&oranges).unwrap();

        let outcome = f
            .reconciler
            .reconcile_dir(&f.root, &mut f.registry, &f.emitter)
            .await
            .unwrap();

        assert_eq!(outcome.diff.removed_dirs, vec![oranges.clone()]);
        assert_eq!(
            drain(&mut f.stream),
            vec![
                ("unlink".to_string(), oranges.join("four.txt")),
                ("unlinkDir".to_string(), oranges.clone()),
            ]
        );
        assert!(!f.observer.is_watching(&oranges.join("four.txt")));
    }

    #[tokio::test]
    async fn test_vanished_directory_removes_itself() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        let bananas = f.root.join("bananas");
        fs::remove_dir_all(&bananas).unwrap();

        let outcome = f
            .reconciler
            .reconcile_dir(&bananas, &mut f.registry, &f.emitter)
            .await
            .unwrap();

        assert_eq!(outcome.removed.len(), 3);
        let events = drain(&mut f.stream);
        assert_eq!(events.last().unwrap(), &("unlinkDir".to_string(), bananas));
        assert_eq!(events.iter().filter(|(name, _)| name == "unlinkDir").count(), 1);
    }

    #[tokio::test]
    async fn test_file_replaced_by_directory() {
        let mut f = fixture("**/*");
        f.reconciler
            .initial_scan(&f.root, &mut f.registry, &f.emitter)
            .await;
        drain(&mut f.stream);

        let one = f.root.join("one.txt");
        fs::remove_file(&one).unwrap();
        fs::create_dir(&one).unwrap();

        f.reconciler
            .reconcile_dir(&f.root, &mut f.registry, &f.emitter)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut f.stream),
            vec![
                ("unlink".to_string(), one.clone()),
                ("addDir".to_string(), one.clone()),
            ]
        );
        assert!(f.registry.is_dir(&one));
        assert!(!f.registry.is_file(&one));
    }

    #[tokio::test]
    async fn test_unwatched_directory_is_ignored() {
        let mut f = fixture("**/*");

        let outcome = f
            .reconciler
            .reconcile_dir(&f.root, &mut f.registry, &f.emitter)
            .await;

        assert!(outcome.is_none());
        assert!(drain(&mut f.stream).is_empty());
        drop(f.temp_dir);
    }

    struct FailingLister;

    #[async_trait]
    impl DirectoryLister for FailingLister {
        async fn list(&self, dir: &Path) -> Result<Vec<ListedPath>> {
            Err(WatchError::ListFailed {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        async fn scan(&self, dir: &Path) -> Result<Vec<ListedPath>> {
            self.list(dir).await
        }
    }

    #[tokio::test]
    async fn test_listing_failure_is_reported_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let (backend, _rx) = MemoryBackend::new();
        let mut registry = WatchRegistry::new(backend);
        let (emitter, mut stream) = Emitter::channel();
        let reconciler = Reconciler::new(Arc::new(FailingLister));

        let snapshot = reconciler.initial_scan(&root, &mut registry, &emitter).await;
        assert_eq!(snapshot.dirs, vec![root.clone()]);

        assert!(reconciler
            .reconcile_dir(&root, &mut registry, &emitter)
            .await
            .is_none());
        assert!(registry.is_dir(&root));

        let names: Vec<String> = drain(&mut stream).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["addDir", "error", "error"]);
    }
}
