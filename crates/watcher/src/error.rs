//! Error types for the watcher.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// Only construction errors are returned to the caller. Everything that
/// happens after the watcher is running is delivered as a
/// [`WatchEvent::Error`](crate::WatchEvent::Error) instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Working directory {path} is not usable: {reason}")]
    InvalidCwd { path: PathBuf, reason: String },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Failed to list {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to load ignore rules: {reason}")]
    IgnoreFailed { reason: String },

    #[error("Failed to load config: {reason}")]
    ConfigError { reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
