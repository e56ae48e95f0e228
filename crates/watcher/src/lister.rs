//! Glob-filtered directory enumeration
//!
//! Patterns are matched against the path relative to the working directory,
//! using `/` as a literal separator: `*` stays within one path component and
//! `**` crosses any number of them.

use crate::error::{Result, WatchError};
use crate::ignore::IgnoreRules;
use crate::resolve::{depth_below, relative_to, resolve};
use crate::PathKind;
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// A path produced by enumeration, classified by the walk itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListedPath {
    pub path: PathBuf,
    pub kind: PathKind,
}

impl ListedPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::File,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::Directory,
        }
    }
}

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: GlobMatcher,
}

impl Pattern {
    /// Compile a glob pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| WatchError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            raw: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Check a path relative to the working directory
    pub fn matches(&self, relative: &Path) -> bool {
        self.matcher.is_match(relative)
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Source of directory listings for the reconciliation engine
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Immediate children of `dir` that match the pattern
    async fn list(&self, dir: &Path) -> Result<Vec<ListedPath>>;

    /// Every matching descendant of `dir`, parents before children
    async fn scan(&self, dir: &Path) -> Result<Vec<ListedPath>>;
}

/// [`DirectoryLister`] backed by `walkdir` and a compiled glob
#[derive(Debug, Clone)]
pub struct GlobLister {
    inner: Arc<ListerInner>,
}

#[derive(Debug)]
struct ListerInner {
    cwd: PathBuf,
    pattern: Pattern,
    ignore: IgnoreRules,
    /// Maximum depth below `cwd` (None = unlimited)
    depth: Option<usize>,
}

impl GlobLister {
    pub fn new(cwd: PathBuf, pattern: Pattern, ignore: IgnoreRules, depth: Option<usize>) -> Self {
        Self {
            inner: Arc::new(ListerInner {
                cwd,
                pattern,
                ignore,
                depth,
            }),
        }
    }

    /// Synchronous walk used by both listing modes
    pub fn walk(&self, dir: &Path, recursive: bool) -> Result<Vec<ListedPath>> {
        let inner = &self.inner;
        let remaining = match inner.depth {
            Some(limit) => limit.saturating_sub(depth_below(&inner.cwd, dir)),
            None => usize::MAX,
        };
        let max_depth = if recursive { remaining } else { remaining.min(1) };

        // Surface a missing or unreadable directory even when the depth
        // budget is exhausted.
        std::fs::read_dir(dir).map_err(|source| WatchError::ListFailed {
            path: dir.to_path_buf(),
            source,
        })?;

        if max_depth == 0 {
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !inner.ignore.should_ignore(e.path(), e.file_type().is_dir()));

        let mut listed = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| WatchError::ListFailed {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
                source: io::Error::from(e),
            })?;

            let Some(relative) = relative_to(&inner.cwd, entry.path()) else {
                continue;
            };
            if !inner.pattern.matches(relative) {
                continue;
            }

            let kind = if entry.file_type().is_dir() {
                PathKind::Directory
            } else {
                PathKind::File
            };
            listed.push(ListedPath {
                path: resolve(&inner.cwd, relative),
                kind,
            });
        }

        Ok(listed)
    }

    async fn walk_blocking(&self, dir: &Path, recursive: bool) -> Result<Vec<ListedPath>> {
        let lister = self.clone();
        let dir = dir.to_path_buf();
        let target = dir.clone();

        tokio::task::spawn_blocking(move || lister.walk(&target, recursive))
            .await
            .map_err(|e| WatchError::ListFailed {
                path: dir,
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            })?
    }
}

#[async_trait]
impl DirectoryLister for GlobLister {
    async fn list(&self, dir: &Path) -> Result<Vec<ListedPath>> {
        self.walk_blocking(dir, false).await
    }

    async fn scan(&self, dir: &Path) -> Result<Vec<ListedPath>> {
        self.walk_blocking(dir, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("bananas/peeled")).unwrap();
        fs::create_dir_all(root.join("oranges")).unwrap();
        fs::write(root.join("one.txt"), b"1").unwrap();
        fs::write(root.join("notes.md"), b"n").unwrap();
        fs::write(root.join("bananas/two.txt"), b"2").unwrap();
        fs::write(root.join("bananas/peeled/three.txt"), b"3").unwrap();
        fs::write(root.join("oranges/four.txt"), b"4").unwrap();
        temp_dir
    }

    fn lister(root: &Path, pattern: &str) -> GlobLister {
        GlobLister::new(
            root.to_path_buf(),
            Pattern::new(pattern).unwrap(),
            IgnoreRules::none(),
            None,
        )
    }

    #[test]
    fn test_pattern_literal_separator() {
        let pattern = Pattern::new("*.txt").unwrap();
        assert!(pattern.matches(Path::new("one.txt")));
        assert!(!pattern.matches(Path::new("bananas/two.txt")));

        let deep = Pattern::new("**/*.txt").unwrap();
        assert!(deep.matches(Path::new("one.txt")));
        assert!(deep.matches(Path::new("bananas/peeled/three.txt")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Pattern::new("src/[").unwrap_err();
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_scan_classifies_and_orders() {
        let temp_dir = fixture();
        let root = temp_dir.path();

        let listed = lister(root, "**/*").walk(root, true).unwrap();

        assert!(listed.contains(&ListedPath::dir(root.join("bananas"))));
        assert!(listed.contains(&ListedPath::dir(root.join("bananas/peeled"))));
        assert!(listed.contains(&ListedPath::file(root.join("bananas/peeled/three.txt"))));
        assert_eq!(listed.len(), 8);

        // Parents are always listed before their children
        let parent = listed.iter().position(|p| p.path == root.join("bananas")).unwrap();
        let child = listed
            .iter()
            .position(|p| p.path == root.join("bananas/two.txt"))
            .unwrap();
        assert!(parent < child);
    }

    #[test]
    fn test_list_is_depth_one() {
        let temp_dir = fixture();
        let root = temp_dir.path();

        let mut listed: Vec<_> = lister(root, "**/*")
            .walk(&root.join("bananas"), false)
            .unwrap()
            .into_iter()
            .map(|p| p.path)
            .collect();
        listed.sort();

        assert_eq!(
            listed,
            vec![root.join("bananas/peeled"), root.join("bananas/two.txt")]
        );
    }

    #[test]
    fn test_pattern_filters_listing() {
        let temp_dir = fixture();
        let root = temp_dir.path();

        let listed = lister(root, "*.txt").walk(root, true).unwrap();
        assert_eq!(listed, vec![ListedPath::file(root.join("one.txt"))]);
    }

    #[test]
    fn test_depth_limit() {
        let temp_dir = fixture();
        let root = temp_dir.path();
        let limited = GlobLister::new(
            root.to_path_buf(),
            Pattern::new("**/*").unwrap(),
            IgnoreRules::none(),
            Some(1),
        );

        let listed = limited.walk(root, true).unwrap();
        assert!(listed.iter().all(|p| p.path.parent() == Some(root)));

        // A directory at the depth limit lists nothing
        assert!(limited.walk(&root.join("bananas"), false).unwrap().is_empty());
    }

    #[test]
    fn test_ignored_directories_are_pruned() {
        let temp_dir = fixture();
        let root = temp_dir.path();
        let config = crate::ignore::IgnoreConfig {
            use_gitignore: false,
            patterns: vec!["bananas/".to_string()],
        };
        let lister = GlobLister::new(
            root.to_path_buf(),
            Pattern::new("**/*").unwrap(),
            IgnoreRules::load(root, &config).unwrap(),
            None,
        );

        let listed = lister.walk(root, true).unwrap();
        assert!(listed.iter().all(|p| !p.path.starts_with(root.join("bananas"))));
        assert!(listed.contains(&ListedPath::file(root.join("oranges/four.txt"))));
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let temp_dir = fixture();
        let root = temp_dir.path();

        let err = lister(root, "**/*").list(&root.join("missing")).await.unwrap_err();
        assert!(matches!(err, WatchError::ListFailed { .. }));
    }
}
