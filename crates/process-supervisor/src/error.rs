//! Error types for process supervision

use thiserror::Error;

use crate::process::ExitStatus;

/// Boxed error returned by pre-start hooks
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for process supervision
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// A pre-start hook rejected the launch
    #[error("pre-start hook failed: {source}")]
    PreStart {
        /// The hook's error
        #[source]
        source: HookError,
    },

    /// The launch was abandoned because the supervisor is shutting down
    #[error("launch cancelled by shutdown")]
    Cancelled,

    /// Process exited with a non-zero code
    #[error("process exited with code {code}")]
    ExitCode {
        /// The exit code
        code: i32,
    },

    /// Process terminated by signal
    #[error("process terminated by signal {signal}")]
    SignalTerminated {
        /// The signal number that terminated the process
        signal: i32,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// A template placeholder was not terminated
    #[error("unterminated placeholder at byte {offset} in {input:?}")]
    Template {
        /// The template text
        input: String,
        /// Byte offset of the opening brace
        offset: usize,
    },

    /// Output sink setup or teardown failed
    #[error(transparent)]
    Log(#[from] rotate_log::Error),

    /// Configuration could not be read
    #[error("invalid configuration: {reason}")]
    Config {
        /// What was wrong with it
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Error describing an abnormal exit, or `None` for a clean one
    pub fn from_exit(status: &ExitStatus) -> Option<Self> {
        if status.success() {
            return None;
        }
        #[cfg(unix)]
        if let Some(signal) = status.signal {
            return Some(Self::SignalTerminated { signal });
        }
        status.code.map(|code| Self::ExitCode { code })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
