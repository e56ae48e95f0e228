//! Event emitter facade
//!
//! Every component publishes through an [`Emitter`]; subscribers read from
//! the paired [`EventStream`]. Closing is a shared flag checked on both
//! sides, so once [`Emitter::close`] returns nothing else is observable,
//! including events still sitting in the channel.

use crate::WatchEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<WatchEvent>,
    closed: Arc<AtomicBool>,
}

impl Emitter {
    /// Create an emitter and the stream it feeds
    pub fn channel() -> (Emitter, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Emitter {
                tx,
                closed: closed.clone(),
            },
            EventStream { rx, closed },
        )
    }

    /// Publish an event. Returns false if it was dropped.
    pub fn emit(&self, event: WatchEvent) -> bool {
        if self.is_closed() {
            debug!("[emitter] dropped after close: {}", event.name());
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shared close flag, for owners that must close without holding a sender
    pub(crate) fn close_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Resolves when the subscriber drops its stream
    pub async fn detached(&self) {
        self.tx.closed().await
    }
}

/// Subscriber side of the facade
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    closed: Arc<AtomicBool>,
}

impl EventStream {
    /// Next event, or `None` once the watcher is closed
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        if self.is_closed() {
            return None;
        }
        let event = self.rx.recv().await?;
        if self.is_closed() {
            return None;
        }
        Some(event)
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        if self.is_closed() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
