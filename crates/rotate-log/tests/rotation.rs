//! Tests for size-based rotation, compression and retention

use flate2::read::GzDecoder;
use rotate_log::{RotateOptions, RotatingWriter};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn archives(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "gz"))
        .collect();
    files.sort();
    files
}

fn decompress(path: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_end(&mut out)
        .unwrap();
    out
}

#[smol_potat::test]
async fn test_single_rotation_on_threshold() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.log");
    let options = RotateOptions::new(path.to_string_lossy())
        .max_size(1024)
        .max_backups(2);
    let mut writer = RotatingWriter::open(&options).unwrap();

    for (i, byte) in [b'a', b'b', b'c', b'd', b'e'].into_iter().enumerate() {
        writer.write_all(&[byte; 300]).unwrap();
        if i == 3 {
            // The fourth write crosses 1024 and rotates before returning
            assert_eq!(writer.size(), 0);
        }
    }

    writer.compressed().await;
    writer.close().unwrap();

    let archived = archives(dir.path());
    assert_eq!(archived.len(), 1, "exactly one rotation should have happened");
    assert!(!dir.path().join("x.log.backup").exists());

    let mut expected = Vec::new();
    for byte in [b'a', b'b', b'c', b'd'] {
        expected.extend_from_slice(&[byte; 300]);
    }
    assert_eq!(decompress(&archived[0]), expected);

    let live = fs::read(&path).unwrap();
    assert_eq!(live, vec![b'e'; 300]);
    assert!(live.len() < 1024);
}

#[smol_potat::test]
async fn test_retention_prunes_oldest_archives() {
    let dir = TempDir::new().unwrap();
    for stamp in ["20200101-000000", "20200102-000000", "20200103-000000"] {
        fs::write(dir.path().join(format!("x-{stamp}.log.gz")), b"old").unwrap();
    }

    let path = dir.path().join("x.log");
    let options = RotateOptions::new(path.to_string_lossy())
        .max_size(100)
        .max_backups(2);
    let writer = RotatingWriter::open(&options).unwrap();
    (&writer).write_all(&[b'z'; 150]).unwrap();
    writer.compressed().await;

    let archived = archives(dir.path());
    assert_eq!(archived.len(), 2);
    assert!(archived[0].ends_with("x-20200103-000000.log.gz"));
    assert_eq!(decompress(&archived[1]), vec![b'z'; 150]);
}

#[smol_potat::test]
async fn test_rapid_rotations_keep_every_byte() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("burst.log");
    let options = RotateOptions::new(path.to_string_lossy()).max_size(256);
    let writer = RotatingWriter::open(&options).unwrap();

    for _ in 0..8 {
        (&writer).write_all(&[b'q'; 200]).unwrap();
    }
    writer.compressed().await;
    writer.close().unwrap();

    let archived = archives(dir.path());
    assert_eq!(archived.len(), 4);

    let total: usize = archived.iter().map(|p| decompress(p).len()).sum::<usize>()
        + fs::read(&path).unwrap().len();
    assert_eq!(total, 8 * 200);
}

#[smol_potat::test]
async fn test_shared_writer_across_threads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let options = RotateOptions::new(path.to_string_lossy()).max_size(4096);
    let writer = Arc::new(RotatingWriter::open(&options).unwrap());

    let workers: Vec<_> = (0..2)
        .map(|id| {
            let writer = writer.clone();
            thread::spawn(move || {
                let line = format!("worker-{id}-{}\n", "x".repeat(50));
                for _ in 0..200 {
                    (&*writer).write_all(line.as_bytes()).unwrap();
                }
                line.len() * 200
            })
        })
        .collect();
    let expected: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    writer.compressed().await;
    writer.close().unwrap();

    let mut total = fs::read(&path).unwrap().len();
    for archive in archives(dir.path()) {
        let data = decompress(&archive);
        // Rotation only happens between whole writes
        assert!(data.ends_with(b"\n"));
        total += data.len();
    }
    assert_eq!(total, expected);
}
