//! Event rendering

use owo_colors::OwoColorize;
use serde_json::{json, Value};
use watcher::WatchEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Plain,
    Json,
}

/// One line per event
pub fn render(event: &WatchEvent, format: Format) -> String {
    match format {
        Format::Plain => plain(event),
        Format::Json => to_json(event).to_string(),
    }
}

fn plain(event: &WatchEvent) -> String {
    let name = format!("{:<9}", event.name());
    match event {
        WatchEvent::Add { path } | WatchEvent::AddDir { path } => {
            format!("{} {}", name.green(), path.display())
        }
        WatchEvent::Change { path } => format!("{} {}", name.yellow(), path.display()),
        WatchEvent::Unlink { path } | WatchEvent::UnlinkDir { path } => {
            format!("{} {}", name.red(), path.display())
        }
        WatchEvent::Ready(snapshot) => format!(
            "{} {}",
            name.bold(),
            format!(
                "{} files in {} directories",
                snapshot.files.len(),
                snapshot.dirs.len()
            )
            .dimmed()
        ),
        WatchEvent::Error(e) => format!("{} {}", name.red().bold(), e),
    }
}

fn to_json(event: &WatchEvent) -> Value {
    match event {
        WatchEvent::Ready(snapshot) => json!({
            "event": event.name(),
            "files": snapshot.files,
            "dirs": snapshot.dirs,
        }),
        WatchEvent::Error(e) => json!({
            "event": event.name(),
            "message": e.to_string(),
        }),
        _ => json!({
            "event": event.name(),
            "path": event.path(),
        }),
    }
}
