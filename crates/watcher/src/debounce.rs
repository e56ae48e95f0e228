//! Per-path debouncing logic
//!
//! Each key moves through a two-state machine:
//!
//! ```text
//!            schedule                 take_ready (deadline passed)
//!   Idle ──────────────▶ Pending ───────────────────────────────▶ Idle
//!                         │  ▲                                     ▲
//!                         └──┘ schedule: deadline reset,           │
//!                              first payload kept      cancel ─────┘
//! ```
//!
//! Bursts of raw notifications for one path (write + rename on save, or a
//! file event echoed by its parent directory's watch) collapse into a single
//! payload that fires once the path has been quiet for the window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::time::{Duration, Instant};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Observable state of a debounce key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending,
}

#[derive(Debug)]
struct Pending<T> {
    payload: T,
    deadline: Instant,
}

/// Coalesces payloads by path.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: HashMap<PathBuf, Pending<T>>,
    window: Duration,
}

impl<T> Debouncer<T> {
    /// Create a new debouncer with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Create a new debouncer with the window in milliseconds
    pub fn from_millis(window_ms: u64) -> Self {
        Self::new(Duration::from_millis(window_ms))
    }

    /// Record a raw notification for `key` observed at `now`.
    ///
    /// The first payload of a window wins; later calls only push the
    /// deadline out.
    pub fn schedule(&mut self, key: PathBuf, payload: T, now: Instant) {
        let deadline = now + self.window;
        match self.pending.get_mut(&key) {
            Some(pending) => pending.deadline = deadline,
            None => {
                self.pending.insert(key, Pending { payload, deadline });
            }
        }
    }

    /// Take every payload whose window has elapsed at `now`, earliest first.
    pub fn take_ready(&mut self, now: Instant) -> Vec<T> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut ready: Vec<Pending<T>> = due
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .collect();
        ready.sort_by_key(|p| p.deadline);

        ready.into_iter().map(|p| p.payload).collect()
    }

    /// Drop the pending payload for `key` without firing it
    pub fn cancel(&mut self, key: &Path) -> Option<T> {
        self.pending.remove(key).map(|p| p.payload)
    }

    /// Drop every pending payload for `dir` and paths beneath it
    pub fn cancel_under(&mut self, dir: &Path) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| !key.starts_with(dir));
        before - self.pending.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Earliest deadline among pending keys
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn state(&self, key: &Path) -> DebounceState {
        if self.pending.contains_key(key) {
            DebounceState::Pending
        } else {
            DebounceState::Idle
        }
    }
}
