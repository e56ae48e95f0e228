//! Watcher handle and the owner task behind it
//!
//! One task owns the registry, both debouncers and the reconciler. Raw
//! notifications, timer deadlines and commands from the [`Watcher`] handle
//! all arrive through a single `select!` loop, so registry mutations never
//! race.

use crate::config::WatchOptions;
use crate::debounce::Debouncer;
use crate::emitter::{Emitter, EventStream};
use crate::error::{Result, WatchError};
use crate::ignore::IgnoreRules;
use crate::lister::{GlobLister, Pattern};
use crate::platform::{NotifyBackend, RawEvent, RawKind, RawMessage, RawReceiver, WatchBackend};
use crate::reconcile::{kind_on_disk, Reconciler};
use crate::registry::WatchRegistry;
use crate::resolve::normalize;
use crate::{PathKind, WatchEvent, WatchSnapshot};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

enum Command {
    Snapshot(oneshot::Sender<WatchSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Handle to a running watcher.
///
/// Events are read from the [`EventStream`] returned alongside it. With
/// `persistent` (the default) dropping the handle leaves the watcher
/// running until the stream is dropped too; otherwise dropping the handle
/// closes it.
#[derive(Debug)]
pub struct Watcher {
    commands: mpsc::UnboundedSender<Command>,
    close_flag: Arc<AtomicBool>,
    persistent: bool,
    closed: bool,
}

impl Watcher {
    pub fn builder(pattern: impl Into<String>) -> WatcherBuilder {
        WatcherBuilder::new(pattern)
    }

    /// Start watching `pattern` with the native backend
    pub fn spawn(pattern: impl Into<String>, options: WatchOptions) -> Result<(Watcher, EventStream)> {
        WatcherBuilder::new(pattern).options(options).spawn()
    }

    /// Current registry contents
    pub async fn watched(&self) -> Result<WatchSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| WatchError::ChannelClosed)?;
        rx.await.map_err(|_| WatchError::ChannelClosed)
    }

    /// Stop watching.
    ///
    /// No event is observable once this is called. Resolves after every
    /// handle is closed and every pending debounce is dropped. Calling it
    /// again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_flag.store(true, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Close(tx)).is_err() {
            // Task already finished its own shutdown
            return Ok(());
        }
        rx.await.map_err(|_| WatchError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.close_flag.load(Ordering::SeqCst)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.persistent || self.closed {
            return;
        }
        self.close_flag.store(true, Ordering::SeqCst);
        let (tx, _rx) = oneshot::channel();
        let _ = self.commands.send(Command::Close(tx));
    }
}

/// Fluent construction of a [`Watcher`]
#[derive(Debug, Clone)]
pub struct WatcherBuilder {
    pattern: String,
    options: WatchOptions,
}

impl WatcherBuilder {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: WatchOptions::default(),
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.options.persistent = persistent;
        self
    }

    pub fn debounce_ms(mut self, window_ms: u64) -> Self {
        self.options.debounce_ms = window_ms;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.options.depth = Some(depth);
        self
    }

    /// Exclude paths matching a gitignore-style pattern
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.options.ignore.patterns.push(pattern.into());
        self
    }

    pub fn use_gitignore(mut self, enabled: bool) -> Self {
        self.options.ignore.use_gitignore = enabled;
        self
    }

    pub fn rescan_interval_ms(mut self, interval_ms: u64) -> Self {
        self.options.rescan_interval_ms = Some(interval_ms);
        self
    }

    /// Replace every option at once
    pub fn options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Start watching with the native `notify` backend.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<(Watcher, EventStream)> {
        let (backend, raw_rx) = NotifyBackend::new()?;
        self.spawn_with_backend(backend, raw_rx)
    }

    /// Start watching with a caller-supplied backend
    pub fn spawn_with_backend<B: WatchBackend>(
        self,
        backend: B,
        raw_rx: RawReceiver,
    ) -> Result<(Watcher, EventStream)> {
        self.options.validate()?;
        let cwd = self.options.resolved_cwd()?;
        let pattern = Pattern::new(&relative_pattern(&self.pattern, &cwd)?)?;
        let ignore = IgnoreRules::load(&cwd, &self.options.ignore)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;

        info!(
            "[watcher] watching '{}' under {} ({} ignore sources)",
            pattern.as_str(),
            cwd.display(),
            ignore.active_sources()
        );

        let lister = GlobLister::new(cwd.clone(), pattern, ignore, self.options.depth);
        let (emitter, stream) = Emitter::channel();
        let (commands, command_rx) = mpsc::unbounded_channel();

        let watcher = Watcher {
            commands,
            close_flag: emitter.close_flag(),
            persistent: self.options.persistent,
            closed: false,
        };

        let task = WatchTask {
            root: cwd,
            registry: WatchRegistry::new(backend),
            reconciler: Reconciler::new(Arc::new(lister)),
            changes: Debouncer::from_millis(self.options.debounce_ms),
            reconciles: Debouncer::from_millis(self.options.debounce_ms),
            emitter,
            raw_rx,
            commands: command_rx,
            persistent: self.options.persistent,
            rescan_interval: self.options.rescan_interval_ms.map(Duration::from_millis),
        };
        runtime.spawn(task.run());

        Ok((watcher, stream))
    }
}

/// Strip `cwd` from an absolute pattern; patterns always match relative paths
fn relative_pattern(pattern: &str, cwd: &Path) -> Result<String> {
    let as_path = Path::new(pattern);
    if !as_path.is_absolute() {
        return Ok(pattern.trim_start_matches("./").to_string());
    }

    normalize(as_path)
        .strip_prefix(cwd)
        .ok()
        .and_then(Path::to_str)
        .map(str::to_string)
        .ok_or_else(|| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("absolute pattern is outside {}", cwd.display()),
        })
}

struct WatchTask<B: WatchBackend> {
    root: PathBuf,
    registry: WatchRegistry<B>,
    reconciler: Reconciler,
    /// Pending `change` events, keyed by file
    changes: Debouncer<PathBuf>,
    /// Pending directory re-lists, keyed by directory
    reconciles: Debouncer<PathBuf>,
    emitter: Emitter,
    raw_rx: RawReceiver,
    commands: mpsc::UnboundedReceiver<Command>,
    persistent: bool,
    rescan_interval: Option<Duration>,
}

impl<B: WatchBackend> WatchTask<B> {
    async fn run(mut self) {
        let snapshot = self
            .reconciler
            .initial_scan(&self.root, &mut self.registry, &self.emitter)
            .await;
        self.emitter.emit(WatchEvent::Ready(snapshot));

        let mut rescan = self.rescan_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut handle_dropped = false;
        let mut backend_open = true;

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                command = self.commands.recv(), if !handle_dropped => match command {
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.registry.snapshot());
                    }
                    Some(Command::Close(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        return;
                    }
                    None if self.persistent => {
                        debug!("[watcher] handle dropped, running until the stream is dropped");
                        handle_dropped = true;
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },

                message = self.raw_rx.recv(), if backend_open => match message {
                    Some(message) => self.handle_raw(message).await,
                    None => {
                        warn!("[watcher] backend channel closed");
                        self.emitter.emit(WatchEvent::error(WatchError::ChannelClosed));
                        backend_open = false;
                    }
                },

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_due(Instant::now()).await;
                }

                _ = tick(&mut rescan) => {
                    debug!("[watcher] periodic rescan");
                    self.rescan_all().await;
                }

                _ = self.emitter.detached(), if handle_dropped => {
                    self.shutdown();
                    return;
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.changes.next_deadline(), self.reconciles.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_raw(&mut self, message: RawMessage) {
        match message {
            RawMessage::Event(event) => self.dispatch(event, Instant::now()),
            RawMessage::Rescan => {
                info!("[watcher] backend dropped events, rescanning");
                self.rescan_all().await;
            }
            RawMessage::Error(e) => {
                warn!("[watcher] backend error: {e}");
                self.emitter.emit(WatchEvent::error(e));
            }
        }
    }

    /// Route one raw notification
    fn dispatch(&mut self, event: RawEvent, now: Instant) {
        let RawEvent { path, kind } = event;
        let path = normalize(&path);
        let on_disk = kind_on_disk(&path);

        if self.registry.is_dir(&path) {
            match kind {
                RawKind::Rename if on_disk != Some(PathKind::Directory) => self.remove_dir(&path),
                RawKind::Rename => {
                    // Deleted and recreated under the same name; the old
                    // handle watches an inode that is gone
                    if self.registry.rearm(&path, &self.emitter) {
                        self.reconciles.schedule(path.clone(), path.clone(), now);
                    } else {
                        self.changes.cancel_under(&path);
                        self.reconciles.cancel_under(&path);
                    }
                }
                RawKind::Change => {
                    self.reconciles.schedule(path.clone(), path.clone(), now);
                }
            }
        } else if self.registry.is_file(&path) {
            match kind {
                RawKind::Change => {
                    self.changes.schedule(path.clone(), path.clone(), now);
                    return;
                }
                RawKind::Rename if on_disk == Some(PathKind::File) => {
                    // Replaced in place; the old handle points at the old inode
                    if self.registry.rearm(&path, &self.emitter) {
                        self.changes.schedule(path.clone(), path.clone(), now);
                    }
                }
                RawKind::Rename => {
                    self.changes.cancel(&path);
                    self.registry.remove_file(&path, &self.emitter);
                }
            }
        }

        // Creations, removals and renames of children surface on the parent
        match path.parent() {
            Some(parent) if self.registry.is_dir(parent) => {
                self.reconciles
                    .schedule(parent.to_path_buf(), parent.to_path_buf(), now);
            }
            _ => debug!("[watcher] no watched parent for {}", path.display()),
        }
    }

    async fn fire_due(&mut self, now: Instant) {
        for dir in self.reconciles.take_ready(now) {
            self.reconcile(&dir).await;
        }

        for path in self.changes.take_ready(now) {
            if !self.registry.is_file(&path) {
                continue;
            }
            if kind_on_disk(&path) == Some(PathKind::File) {
                self.emitter.emit(WatchEvent::Change { path });
            } else {
                self.registry.remove_file(&path, &self.emitter);
            }
        }
    }

    async fn reconcile(&mut self, dir: &Path) {
        let outcome = self
            .reconciler
            .reconcile_dir(dir, &mut self.registry, &self.emitter)
            .await;

        if let Some(outcome) = outcome {
            for path in &outcome.removed {
                self.changes.cancel(path);
                self.reconciles.cancel(path);
            }
        }
    }

    /// Reconcile every watched directory, shallowest first
    async fn rescan_all(&mut self) {
        for dir in self.registry.dirs() {
            // An earlier pass may have removed it along with a parent
            if self.registry.is_dir(&dir) {
                self.reconcile(&dir).await;
            }
        }
    }

    fn remove_dir(&mut self, dir: &Path) {
        let removed = self.registry.remove_dir(dir, &self.emitter);
        let cancelled = self.changes.cancel_under(dir) + self.reconciles.cancel_under(dir);
        debug!(
            "[watcher] removed {} ({} paths, {} pending cancelled)",
            dir.display(),
            removed.len(),
            cancelled
        );
    }

    fn shutdown(&mut self) {
        self.emitter.close();
        self.changes.clear();
        self.reconciles.clear();
        let closed = self.registry.close_all();
        info!("[watcher] closed {closed} watch handles");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
