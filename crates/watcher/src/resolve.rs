//! Path resolution for glob matches
//!
//! Glob enumeration matches paths relative to the working directory and
//! classifies them from the walk itself. Everything stored in
//! the registry is absolute and lexically normalized so that `a/`, `a` and
//! `./a` all resolve to the same key.

use std::path::{Component, Path, PathBuf};

/// Resolve `relative` against `base` into a normalized absolute path.
///
/// Absolute inputs ignore `base`. `.` components are dropped and `..`
/// components pop the previous one. A trailing slash does not change the
/// identity: `a/` and `a` resolve to the same path.
pub fn resolve(base: &Path, relative: impl AsRef<Path>) -> PathBuf {
    let joined = base.join(relative.as_ref());
    normalize(&joined)
}

/// Lexically normalize a path without touching the file system
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Path of `path` relative to `base`, if it lives under it
pub fn relative_to<'a>(base: &Path, path: &'a Path) -> Option<&'a Path> {
    path.strip_prefix(base).ok()
}

/// Number of normal components between `base` and `path`
pub fn depth_below(base: &Path, path: &Path) -> usize {
    relative_to(base, path)
        .map(|rel| rel.components().count())
        .unwrap_or(0)
}
