use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error surface for the store, subscription, control socket, reload trigger
/// and reconciliation runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table file error: {0}")]
    Table(#[from] mapway_table::TableError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("control socket unavailable at {socket}: {source}")]
    ControlUnavailable {
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command `{command}` failed: {detail}")]
    Reload { command: String, detail: String },

    #[error("subscription to channel '{channel}' closed")]
    SubscriptionClosed { channel: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
