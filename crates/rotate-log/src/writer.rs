//! Append-only log file that rotates past a size threshold

use smol::{Task, Timer};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::archive::{self, ArchiveLayout};
use crate::error::{Error, Result};
use crate::options::RotateOptions;
use crate::size::format_size;

/// Quiet period after a write before the file is fsynced
pub const FLUSH_DELAY: Duration = Duration::from_secs(1);

/// A log file that is rotated, compressed and pruned as it grows.
///
/// Cloning is cheap and every clone appends to the same file with the same
/// size counter, so the stdout and stderr of one process can share a writer.
///
/// Ordinary appends only take the shared side of the file lock; rotation
/// takes the exclusive side. When the running size reaches `max_size` the
/// current file is synced, closed and renamed to `<path>.backup`, a
/// background task gzips it to `<stem>-<YYYYMMDD-HHMMSS><ext>.gz` and prunes
/// archives beyond `max_backups`, and a fresh file is opened at `path`.
/// Appends never wait for compression: if an earlier backup is still
/// pending, the new one is parked at `<path>.backup.N` and archives are
/// written in rotation order.
#[derive(Clone)]
pub struct RotatingWriter {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    max_size: u64,
    max_backups: usize,
    layout: ArchiveLayout,
    /// `None` once closed
    file: RwLock<Option<File>>,
    size: AtomicU64,
    flush_pending: AtomicBool,
    flush_task: Mutex<Option<Task<()>>>,
    /// Deferred fsyncs performed so far
    deferred_syncs: AtomicU64,
    /// Rotated files waiting for compression, oldest first
    pending: Arc<Mutex<VecDeque<PathBuf>>>,
    /// Held by the compression job currently running
    archiving: Arc<Mutex<()>>,
    compressions: Mutex<Vec<Task<()>>>,
}

impl RotatingWriter {
    /// Open (or create) the log file described by `options`
    pub fn open(options: &RotateOptions) -> Result<Self> {
        let path = PathBuf::from(options.path.trim());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::open_failed(parent, e))?;
        }

        let file = open_append(&path).map_err(|e| Error::open_failed(&path, e))?;
        let size = file.metadata()?.len();

        let writer = Self {
            inner: Arc::new(Inner {
                layout: ArchiveLayout::new(&path),
                path,
                max_size: options.max_size,
                max_backups: options.max_backups,
                file: RwLock::new(Some(file)),
                size: AtomicU64::new(size),
                flush_pending: AtomicBool::new(false),
                flush_task: Mutex::new(None),
                deferred_syncs: AtomicU64::new(0),
                pending: Arc::new(Mutex::new(VecDeque::new())),
                archiving: Arc::new(Mutex::new(())),
                compressions: Mutex::new(Vec::new()),
            }),
        };

        // A backup left behind by an earlier run is archived first
        let leftover = writer.inner.layout.backup_path();
        if leftover.exists() {
            tracing::info!(backup = %leftover.display(), "Archiving leftover rotated log");
            writer.spawn_compression(leftover.to_path_buf());
        }

        Ok(writer)
    }

    /// Path of the live log file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Bytes in the live file as tracked by the running counter
    pub fn size(&self) -> u64 {
        self.inner.size.load(Ordering::Acquire)
    }

    /// Append `buf` to the live file.
    ///
    /// A failed write returns immediately and leaves the size counter alone.
    /// Crossing the size threshold rotates before returning; otherwise a
    /// flush is scheduled unless one is already pending. The bytes are
    /// already in the file when rotation runs, so a failed rotation is
    /// logged and retried on the next append instead of failing this one.
    pub fn append(&self, buf: &[u8]) -> io::Result<usize> {
        let inner = &self.inner;

        let written = {
            let current = inner.file.read().map_err(poisoned)?;
            let mut file = current.as_ref().ok_or_else(closed)?;
            file.write(buf)?
        };

        let size = inner.size.fetch_add(written as u64, Ordering::AcqRel) + written as u64;
        if inner.max_size > 0 && size >= inner.max_size {
            if let Err(e) = self.rotate() {
                tracing::warn!(path = %inner.path.display(), error = %e, "Failed to rotate log file");
            }
        } else {
            self.schedule_flush();
        }

        Ok(written)
    }

    fn rotate(&self) -> io::Result<()> {
        let inner = &self.inner;
        let mut current = inner.file.write().map_err(poisoned)?;

        let size = inner.size.load(Ordering::Acquire);
        if size < inner.max_size {
            // Another writer crossed the threshold first and already rotated.
            return Ok(());
        }

        let file = current.take().ok_or_else(closed)?;
        let _ = file.sync_all();
        drop(file);

        let backup = inner.layout.free_backup_path();
        if let Err(e) = fs::rename(&inner.path, &backup) {
            *current = Some(open_append(&inner.path)?);
            return Err(e);
        }

        let file = open_append(&inner.path)?;
        inner.size.store(file.metadata()?.len(), Ordering::Release);
        *current = Some(file);
        drop(current);

        tracing::info!(
            path = %inner.path.display(),
            size = %format_size(size),
            "Rotated log file"
        );
        self.spawn_compression(backup);
        Ok(())
    }

    /// Queue a rotated file and start a job to archive the oldest queued one
    fn spawn_compression(&self, source: PathBuf) {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(source);

        let layout = self.inner.layout.clone();
        let keep = self.inner.max_backups;
        let pending = self.inner.pending.clone();
        let archiving = self.inner.archiving.clone();

        let task = smol::unblock(move || {
            let _guard = archiving.lock().unwrap_or_else(PoisonError::into_inner);
            let next = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(source) = next else { return };
            if let Err(e) = archive::archive_file(&layout, &source, keep) {
                tracing::warn!(
                    backup = %source.display(),
                    error = %e,
                    "Failed to compress rotated log, keeping uncompressed backup"
                );
            }
        });

        let mut compressions = self
            .inner
            .compressions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        compressions.retain(|task| !task.is_finished());
        compressions.push(task);
    }

    fn schedule_flush(&self) {
        let inner = &self.inner;
        if inner
            .flush_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let weak = Arc::downgrade(inner);
        let task = smol::spawn(async move {
            Timer::after(FLUSH_DELAY).await;
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = inner.sync() {
                    tracing::debug!(path = %inner.path.display(), error = %e, "Deferred log flush failed");
                }
                inner.deferred_syncs.fetch_add(1, Ordering::AcqRel);
                inner.flush_pending.store(false, Ordering::Release);
            }
        });

        if let Ok(mut slot) = inner.flush_task.lock() {
            *slot = Some(task);
        }
    }

    /// Fsync the live file now
    pub fn sync(&self) -> io::Result<()> {
        self.inner.sync()
    }

    /// Stop the flush timer, then sync and close the live file.
    ///
    /// Later appends fail. Closing an already closed writer is a no-op.
    pub fn close(&self) -> io::Result<()> {
        let inner = &self.inner;
        if let Ok(mut slot) = inner.flush_task.lock() {
            drop(slot.take());
        }
        inner.flush_pending.store(false, Ordering::Release);

        let file = inner.file.write().map_err(poisoned)?.take();
        match file {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }

    /// Wait for every compression started so far to finish
    pub async fn compressed(&self) {
        let pending = std::mem::take(
            &mut *self
                .inner
                .compressions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in pending {
            task.await;
        }
    }
}

impl Inner {
    fn sync(&self) -> io::Result<()> {
        let current = self.file.read().map_err(poisoned)?;
        match current.as_ref() {
            Some(file) => file.sync_data(),
            None => Ok(()),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Let outstanding compressions finish instead of cancelling them.
        let compressions = self
            .compressions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in compressions.drain(..) {
            task.detach();
        }
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.inner.path)
            .field("size", &self.size())
            .field("max_size", &self.inner.max_size)
            .field("max_backups", &self.inner.max_backups)
            .field("deferred_syncs", &self.inner.deferred_syncs.load(Ordering::Relaxed))
            .finish()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn poisoned<T>(_: PoisonError<T>) -> io::Error {
    io::Error::other("rotating writer lock poisoned")
}

fn closed() -> io::Error {
    io::Error::other("log writer is closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(dir: &TempDir, max_size: u64) -> RotatingWriter {
        let path = dir.path().join("app.log");
        RotatingWriter::open(&RotateOptions::new(path.to_string_lossy()).max_size(max_size))
            .unwrap()
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.log");
        let w = RotatingWriter::open(&RotateOptions::new(path.to_string_lossy())).unwrap();
        assert!(path.exists());
        assert_eq!(w.size(), 0);
    }

    #[test]
    fn test_size_starts_from_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), b"0123456789").unwrap();
        let w = writer(&dir, 0);
        assert_eq!(w.size(), 10);
    }

    #[test]
    fn test_append_counts_bytes() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 0);
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        assert_eq!(w.size(), 11);
        assert_eq!(fs::read(w.path()).unwrap(), b"hello world");
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 0);
        (&w).write_all(b"before").unwrap();
        w.close().unwrap();
        assert!((&w).write_all(b"after").is_err());
        assert_eq!(w.size(), 6);
        // Closing twice is harmless
        w.close().unwrap();
    }

    #[smol_potat::test]
    async fn test_failed_rotation_keeps_the_write() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 100);
        // Renaming a file that is gone fails; the open handle still accepts data
        fs::remove_file(w.path()).unwrap();

        assert_eq!(w.append(&[b'x'; 150]).unwrap(), 150);
        assert!(w.path().exists(), "live file is reopened after a failed rotation");
        assert!(!dir.path().join("app.log.backup").exists());

        // The next crossing rotates normally
        assert_eq!(w.append(&[b'y'; 10]).unwrap(), 10);
        w.compressed().await;
        assert_eq!(w.size(), 0);
        assert!(!dir.path().join("app.log.backup").exists());
    }

    #[smol_potat::test]
    async fn test_pending_backup_is_not_replaced() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 100);
        // Hold the compression slot so the first backup stays pending
        let guard = w.inner.archiving.lock().unwrap();

        (&w).write_all(&[b'a'; 120]).unwrap();
        (&w).write_all(&[b'b'; 120]).unwrap();
        assert_eq!(fs::read(dir.path().join("app.log.backup")).unwrap(), [b'a'; 120]);
        assert_eq!(fs::read(dir.path().join("app.log.backup.1")).unwrap(), [b'b'; 120]);

        drop(guard);
        w.compressed().await;
        assert!(!dir.path().join("app.log.backup").exists());
        assert!(!dir.path().join("app.log.backup.1").exists());
        assert_eq!(w.inner.layout.archives().len(), 2);
    }

    #[smol_potat::test]
    async fn test_leftover_backup_is_archived_on_open() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log.backup"), b"from last run").unwrap();

        let w = writer(&dir, 0);
        w.compressed().await;
        assert!(!dir.path().join("app.log.backup").exists());
        assert_eq!(w.inner.layout.archives().len(), 1);
    }

    #[smol_potat::test]
    async fn test_flush_runs_once_per_burst() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 0);

        for _ in 0..50 {
            (&w).write_all(b"burst\n").unwrap();
        }
        assert!(w.inner.flush_pending.load(Ordering::Acquire));

        Timer::after(FLUSH_DELAY + Duration::from_millis(500)).await;
        assert_eq!(w.inner.deferred_syncs.load(Ordering::Acquire), 1);
        assert!(!w.inner.flush_pending.load(Ordering::Acquire));

        (&w).write_all(b"again\n").unwrap();
        Timer::after(FLUSH_DELAY + Duration::from_millis(500)).await;
        assert_eq!(w.inner.deferred_syncs.load(Ordering::Acquire), 2);
    }

    #[test]
    fn test_zero_max_size_never_rotates() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 0);
        for _ in 0..10 {
            (&w).write_all(&[b'x'; 512]).unwrap();
        }
        assert_eq!(w.size(), 5120);
        assert!(!dir.path().join("app.log.backup").exists());
    }
}
