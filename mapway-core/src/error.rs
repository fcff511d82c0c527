//! Error types for mapway-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes the file path and serde_yaml's line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (`mapway config`).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field holds a value the agent cannot run with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reasons a decoded change request is discarded before touching any projection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEvent {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("empty key")]
    EmptyKey,

    #[error("key '{0}' contains whitespace")]
    KeyHasWhitespace(String),

    #[error("empty value for key '{0}'")]
    EmptyValue(String),

    #[error("value for key '{0}' contains a line break")]
    ValueHasLineBreak(String),
}
