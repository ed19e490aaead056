//! Compression and retention of rotated log files

use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Naming scheme for the archives of one log file.
///
/// For `logs/app.log` the transient backup is `logs/app.log.backup` and
/// archives are `logs/app-YYYYMMDD-HHMMSS.log.gz`.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveLayout {
    dir: PathBuf,
    stem: String,
    ext: String,
    backup: PathBuf,
}

impl ArchiveLayout {
    pub(crate) fn new(path: &Path) -> Self {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stem = name[..name.len() - ext.len()].to_string();

        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");

        Self {
            dir,
            stem,
            ext,
            backup: PathBuf::from(backup),
        }
    }

    /// The sibling name a rotated file is moved to while it awaits compression
    pub(crate) fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// `backup_path`, or `<backup>.N` when that is still occupied by a
    /// file waiting for (or left over from) an earlier compression
    pub(crate) fn free_backup_path(&self) -> PathBuf {
        if !self.backup.exists() {
            return self.backup.clone();
        }
        let mut n = 1;
        loop {
            let mut candidate = self.backup.as_os_str().to_owned();
            candidate.push(format!(".{n}"));
            let candidate = PathBuf::from(candidate);
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// A fresh archive name stamped with the current local time.
    ///
    /// A second rotation within the same second gets a `_NN` suffix, which
    /// still sorts after the unsuffixed name.
    pub(crate) fn archive_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut path = self
            .dir
            .join(format!("{}-{}{}.gz", self.stem, stamp, self.ext));
        let mut n = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}-{}_{:02}{}.gz", self.stem, stamp, n, self.ext));
            n += 1;
        }
        path
    }

    /// All archives of this log currently on disk, oldest first.
    ///
    /// Only `<stem>-YYYYMMDD-HHMMSS[_NN]<ext>.gz` counts, so archives of a
    /// sibling log such as `app.err.log` next to `app.log` are left alone.
    pub(crate) fn archives(&self) -> Vec<PathBuf> {
        let name = format!(
            "{}-*{}.gz",
            glob::Pattern::escape(&self.stem),
            glob::Pattern::escape(&self.ext)
        );
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = Path::new(&dir).join(name).to_string_lossy().into_owned();

        let archive_name = format!(
            r"^{}-\d{{8}}-\d{{6}}(?:_\d+)?{}\.gz$",
            regex::escape(&self.stem),
            regex::escape(&self.ext)
        );
        let archive_name = match Regex::new(&archive_name) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(pattern = %archive_name, error = %e, "Invalid archive name pattern");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = match glob::glob(&pattern) {
            Ok(paths) => paths
                .flatten()
                .filter(|path| {
                    path.file_name()
                        .is_some_and(|name| archive_name.is_match(&name.to_string_lossy()))
                })
                .collect(),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid archive pattern");
                Vec::new()
            }
        };
        files.sort();
        files
    }
}

/// Gzip `source` into `target`, removing `source` only on success.
///
/// A partially written `target` is removed when compression fails, leaving
/// the uncompressed source untouched.
pub(crate) fn compress(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;

    let written = (|| {
        let output = File::create(target)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        let output = encoder.finish()?;
        output.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(target);
        return Err(e);
    }

    drop(input);
    fs::remove_file(source)
}

/// Delete the oldest archives until at most `keep` remain.
///
/// Returns the number of files removed. `keep == 0` disables pruning.
pub(crate) fn prune(layout: &ArchiveLayout, keep: usize) -> usize {
    if keep == 0 {
        return 0;
    }

    let files = layout.archives();
    if files.len() <= keep {
        return 0;
    }

    let excess = files.len() - keep;
    let mut removed = 0;
    for path in files.iter().take(excess) {
        match fs::remove_file(path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!(path = %path.display(), "Deleted old log archive");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete old log archive");
            }
        }
    }
    removed
}

/// Compress one rotated file into a fresh archive and apply retention.
///
/// Returns the archive path. On failure the source is left in place.
pub(crate) fn archive_file(layout: &ArchiveLayout, source: &Path, keep: usize) -> io::Result<PathBuf> {
    let target = layout.archive_path();
    compress(source, &target)?;
    tracing::debug!(source = %source.display(), archive = %target.display(), "Compressed rotated log");

    prune(layout, keep);
    Ok(target)
}
