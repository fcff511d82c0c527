//! Error types for mapway-table.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from table file operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The table file must exist before a key can be removed from it.
    #[error("table file not found at {path}")]
    Missing { path: PathBuf },
}

/// Convenience constructor for [`TableError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TableError {
    TableError::Io {
        path: path.into(),
        source,
    }
}
