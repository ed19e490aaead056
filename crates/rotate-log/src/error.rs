//! Error types for rotating log sinks

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for log sinks
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open (or create) a log file
    #[error("failed to open log file {}: {source}", path.display())]
    OpenFailed {
        /// The log file that could not be opened
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// One or more writers failed to close
    #[error("failed to close {} log writer(s): {}", errors.len(), summarize(errors))]
    CloseFailed {
        /// Every close failure, keyed by the writer's path
        errors: Vec<(PathBuf, io::Error)>,
    },

    /// A size value in the configuration could not be parsed
    #[error("invalid size {input:?}: {reason}")]
    InvalidSize {
        /// The text that failed to parse
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an open failed error
    pub fn open_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::OpenFailed {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid size error
    pub fn invalid_size(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

fn summarize(errors: &[(PathBuf, io::Error)]) -> String {
    errors
        .iter()
        .map(|(path, err)| format!("{}: {}", path.display(), err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
