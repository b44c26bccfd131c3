//! Error types for the log watcher library.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for log watcher operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors outside the watched file (sinks, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watched file does not exist.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The watched file exists but cannot be opened.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Stat or read failure while polling an open file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected at construction.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Lifecycle operation not allowed in the current state.
    #[error("Invalid watcher state: {message}")]
    InvalidState { message: String },

    /// Reopen attempts ran out; the watcher is now errored.
    #[error("Gave up after {attempts} reopen attempts")]
    RetriesExhausted { attempts: u32 },

    /// A classifier could not make sense of a line.
    #[error("Classification failed: {message}")]
    Classification { message: String },

    /// A sink could not handle an event.
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// JSON encoding or decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration decoding errors.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Event stream receiver has been dropped.
    #[error("Stream closed")]
    StreamClosed,
}

impl Error {
    /// Maps an error from opening `path` onto the open-failure variants.
    pub(crate) fn from_open(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}

/// A convenient Result type for log watcher operations.
pub type Result<T> = std::result::Result<T, Error>;
