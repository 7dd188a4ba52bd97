//! Error types for flowcollectord

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in flowcollectord
///
/// Per-packet problems (malformed datagrams, unknown templates) never surface
/// here; they are counted and logged by the worker that hit them. These are
/// the errors that abort startup or fail a collaborator call.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid configuration value or unreadable config file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listen address could not be resolved or bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// BIRD control socket session failed
    #[error("BIRD session {path}: {reason}")]
    Bird { path: PathBuf, reason: String },

    /// Flow sink could not be opened or written
    #[error("Sink error: {0}")]
    Sink(String),

    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for flowcollectord operations
pub type Result<T> = std::result::Result<T, CollectorError>;
