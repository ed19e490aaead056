//! Rotation settings and per-stream logger configuration

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Settings for a single rotating log file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateOptions {
    /// Path of the live log file
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Host stream to mirror output to: `"out"` or `"err"`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub std: String,
    /// Size threshold in bytes that triggers rotation (0 disables rotation)
    #[serde(deserialize_with = "crate::size::deserialize")]
    pub max_size: u64,
    /// Number of compressed archives to retain (0 keeps all of them)
    pub max_backups: usize,
}

impl RotateOptions {
    /// Create options for the given path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the rotation threshold
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the number of retained archives
    pub fn max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Mirror the output to a host stream (`"out"` or `"err"`)
    pub fn std(mut self, std: impl Into<String>) -> Self {
        self.std = std.into();
        self
    }

    /// Merge layered settings, most specific first.
    ///
    /// Each field takes the first non-empty value among the layers, so an
    /// empty field in a stream override falls back to the combined default.
    pub fn merge<'a, I>(layers: I) -> RotateOptions
    where
        I: IntoIterator<Item = Option<&'a RotateOptions>>,
    {
        let mut merged = RotateOptions::default();
        for layer in layers.into_iter().flatten() {
            if merged.path.is_empty() {
                merged.path = layer.path.trim().to_string();
            }
            if merged.std.is_empty() {
                merged.std = layer.std.trim().to_string();
            }
            if merged.max_size == 0 {
                merged.max_size = layer.max_size;
            }
            if merged.max_backups == 0 {
                merged.max_backups = layer.max_backups;
            }
        }
        merged
    }

    /// The host stream selected by the `std` tag, if any
    pub fn passthrough(&self) -> Option<Passthrough> {
        Passthrough::parse(&self.std)
    }
}

/// Logger configuration for a child's output streams
///
/// The flattened fields are the combined settings shared by both streams;
/// `stdout` and `stderr` override them field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Settings shared by both streams
    #[serde(flatten)]
    pub combined: RotateOptions,
    /// Overrides for standard output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<RotateOptions>,
    /// Overrides for standard error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<RotateOptions>,
}

impl LoggerConfig {
    /// Effective settings for standard output
    pub fn stdout_options(&self) -> RotateOptions {
        RotateOptions::merge([self.stdout.as_ref(), Some(&self.combined)])
    }

    /// Effective settings for standard error
    pub fn stderr_options(&self) -> RotateOptions {
        RotateOptions::merge([self.stderr.as_ref(), Some(&self.combined)])
    }
}

/// One of the host's own standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// The supervisor's standard output
    Stdout,
    /// The supervisor's standard error
    Stderr,
}

impl Passthrough {
    /// Parse a passthrough tag; unknown tags select nothing
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "out" => Some(Self::Stdout),
            "err" => Some(Self::Stderr),
            _ => None,
        }
    }

    pub(crate) fn write_all(self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout => io::stdout().lock().write_all(buf),
            Self::Stderr => io::stderr().lock().write_all(buf),
        }
    }
}
