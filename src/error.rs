//! Errors returned by every public operation of this crate

use thiserror::Error;

/// The single error type of this crate.
///
/// Per-task failures that happen while reflecting a change on the server during a sync are *not* errors:
/// see [`SyncWarning`](crate::sync::SyncWarning).
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid user input, malformed iCal data or malformed persisted file
    #[error("parse error: {0}")]
    Parse(String),

    /// Local file read or write failure.
    /// The in-memory state may be ahead of the disk when this is returned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP failure (transport, timeout or unexpected status code)
    #[error("network error: {0}")]
    Network(String),

    /// No task with this id in the list the operation works on
    #[error("no task with id {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
