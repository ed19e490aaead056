//! Builds output sinks for a child's standard streams

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::options::{Passthrough, RotateOptions};
use crate::writer::RotatingWriter;

/// Creates sinks for one process run and owns the writers behind them.
///
/// Writers are deduplicated by absolute path: two streams configured with the
/// same file share one writer and one size counter.
#[derive(Debug, Default)]
pub struct LoggerFactory {
    writers: HashMap<PathBuf, RotatingWriter>,
}

impl LoggerFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sink from layered settings, most specific first.
    ///
    /// Returns `None` when the merged settings name neither a file nor a
    /// host stream.
    pub fn create<'a, I>(&mut self, layers: I) -> Result<Option<Sink>>
    where
        I: IntoIterator<Item = Option<&'a RotateOptions>>,
    {
        let mut options = RotateOptions::merge(layers);

        let file = if options.path.is_empty() {
            None
        } else {
            let path = absolute(Path::new(&options.path))?;
            let writer = match self.writers.get(&path) {
                Some(writer) => writer.clone(),
                None => {
                    options.path = path.to_string_lossy().into_owned();
                    let writer = RotatingWriter::open(&options)?;
                    tracing::debug!(
                        path = %path.display(),
                        max_size = options.max_size,
                        max_backups = options.max_backups,
                        "Created rotating log writer"
                    );
                    self.writers.insert(path, writer.clone());
                    writer
                }
            };
            Some(writer)
        };

        let passthrough = options.passthrough();
        if let Some(std) = passthrough {
            tracing::debug!(std = ?std, "Mirroring output to host stream");
        }

        if file.is_none() && passthrough.is_none() {
            return Ok(None);
        }
        Ok(Some(Sink { file, passthrough }))
    }

    /// Number of distinct writers created so far
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Whether no writer has been created
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Close every writer and forget them.
    ///
    /// All writers are closed even if some fail; the failures are reported
    /// together. Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let mut errors = Vec::new();
        for (path, writer) in self.writers.drain() {
            if let Err(e) = writer.close() {
                errors.push((path, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::CloseFailed { errors })
        }
    }

    /// Wait for background compression of every writer to finish
    pub async fn compressed(&self) {
        for writer in self.writers.values() {
            writer.compressed().await;
        }
    }
}

/// Output sink for one standard stream of a child process
#[derive(Debug, Clone)]
pub struct Sink {
    file: Option<RotatingWriter>,
    passthrough: Option<Passthrough>,
}

impl Sink {
    /// The rotating file behind this sink, if any
    pub fn writer(&self) -> Option<&RotatingWriter> {
        self.file.as_ref()
    }

    /// The host stream this sink mirrors to, if any
    pub fn passthrough(&self) -> Option<Passthrough> {
        self.passthrough
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            (&*file).write_all(buf)?;
        }
        if let Some(std) = self.passthrough {
            std.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Make `path` absolute against the current directory and drop `.`/`..`
/// components lexically, without touching the filesystem.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    Ok(clean(&std::path::absolute(path)?))
}

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// the preceding component where possible.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean() {
        assert_eq!(clean(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean(Path::new("")), PathBuf::from("."));
        assert_eq!(clean(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(clean(Path::new("/srv/app/")), PathBuf::from("/srv/app"));
    }

    #[test]
    fn test_no_sink_without_path_or_std() {
        let mut factory = LoggerFactory::new();
        let sink = factory.create([Some(&RotateOptions::default())]).unwrap();
        assert!(sink.is_none());
        assert!(factory.is_empty());
    }

    #[test]
    fn test_std_only_sink() {
        let mut factory = LoggerFactory::new();
        let sink = factory
            .create([Some(&RotateOptions::default().std("out"))])
            .unwrap()
            .unwrap();
        assert!(sink.writer().is_none());
        assert_eq!(sink.passthrough(), Some(Passthrough::Stdout));
    }

    #[test]
    fn test_shared_path_shares_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let combined = RotateOptions::new(path.to_string_lossy());
        let stderr = RotateOptions::new(dir.path().join(".").join("app.log").to_string_lossy());

        let mut factory = LoggerFactory::new();
        let mut out = factory.create([None, Some(&combined)]).unwrap().unwrap();
        let mut err = factory.create([Some(&stderr), Some(&combined)]).unwrap().unwrap();
        assert_eq!(factory.len(), 1);

        out.write_all(b"out\n").unwrap();
        err.write_all(b"err\n").unwrap();
        assert_eq!(out.writer().unwrap().size(), 8);
        assert_eq!(err.writer().unwrap().size(), 8);

        factory.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "out\nerr\n");
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut factory = LoggerFactory::new();
        factory
            .create([Some(&RotateOptions::new(
                dir.path().join("a.log").to_string_lossy(),
            ))])
            .unwrap();
        factory.close().unwrap();
        assert!(factory.is_empty());
        factory.close().unwrap();
    }

    #[test]
    fn test_sink_writes_file_and_passthrough() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("both.log");
        let options = RotateOptions::new(path.to_string_lossy()).std("err");

        let mut factory = LoggerFactory::new();
        let mut sink = factory.create([Some(&options)]).unwrap().unwrap();
        assert_eq!(sink.passthrough(), Some(Passthrough::Stderr));

        assert_eq!(sink.write(b"to both\n").unwrap(), 8);
        sink.write_all(b"again\n").unwrap();
        assert_eq!(sink.writer().unwrap().size(), 14);

        factory.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "to both\nagain\n");
    }

    // Character devices reject fsync, so closing their writers fails
    #[cfg(target_os = "linux")]
    #[test]
    fn test_close_reports_every_failure() {
        let mut factory = LoggerFactory::new();
        for device in ["/dev/null", "/dev/full"] {
            factory.create([Some(&RotateOptions::new(device))]).unwrap();
        }
        assert_eq!(factory.len(), 2);

        match factory.close() {
            Err(Error::CloseFailed { errors }) => {
                let mut paths: Vec<_> = errors.iter().map(|(path, _)| path.clone()).collect();
                paths.sort();
                assert_eq!(paths, [PathBuf::from("/dev/full"), PathBuf::from("/dev/null")]);
            }
            other => panic!("expected CloseFailed, got {other:?}"),
        }

        assert!(factory.is_empty());
        factory.close().unwrap();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let mut factory = LoggerFactory::new();
        let result = factory.create([Some(&RotateOptions::new(
            blocker.join("app.log").to_string_lossy(),
        ))]);
        assert!(matches!(result, Err(Error::OpenFailed { .. })));
    }
}
