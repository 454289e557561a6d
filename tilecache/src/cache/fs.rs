//! Filesystem access for tile backing files.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// What a delete call found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file existed and was removed.
    Deleted,
    /// The file was already gone.
    Missing,
}

/// File operations the cache needs for backing files.
///
/// Implementations must be safe to call from several worker threads.
pub trait TileFileStore: Send + Sync {
    /// Delete the file at `path`. A missing file is `Ok(DeleteOutcome::Missing)`.
    fn delete(&self, path: &Path) -> io::Result<DeleteOutcome>;

    /// Returns true if a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Read the whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `data`, creating parent directories as needed.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// [`TileFileStore`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl TileFileStore for LocalFileStore {
    fn delete(&self, path: &Path) -> io::Result<DeleteOutcome> {
        match fs::remove_file(path) {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::Missing),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write to a unique sibling then rename so readers never see a partial tile
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}.part", std::process::id(), seq));
        let result = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}
