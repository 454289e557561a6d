//! Tile cache facade tying the index, tile files and eviction together.

use std::fs;
use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::catalog::RendererCatalog;
use crate::cache::clock::{Clock, SystemClock};
use crate::cache::database::CacheDatabase;
use crate::cache::eviction::EvictionEngine;
use crate::cache::fs::{LocalFileStore, TileFileStore};
use crate::cache::index::CacheIndex;
use crate::cache::path::{HierarchicalPathResolver, TilePathResolver};
use crate::cache::types::{CacheConfig, CacheError, TileKey};

/// Disk-backed tile cache.
///
/// Tile bytes live in files laid out by a [`TilePathResolver`]; metadata
/// lives in the [`CacheIndex`]. A file is always written before its index
/// row so the index never advertises bytes that are not on disk yet.
pub struct TileCache {
    db: Arc<CacheDatabase>,
    index: Arc<CacheIndex>,
    catalog: RendererCatalog,
    resolver: Arc<dyn TilePathResolver>,
    files: Arc<dyn TileFileStore>,
    engine: Arc<EvictionEngine>,
}

impl TileCache {
    /// Open the cache described by `config`.
    ///
    /// Creates the cache directory and index database if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the index cannot
    /// be opened.
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let db = Arc::new(CacheDatabase::open(&config.index_path())?);
        info!(
            directory = %config.directory.display(),
            max_mb = config.max_size_bytes / 1_000_000,
            "Tile cache opened"
        );

        Ok(Self::with_components(
            db,
            Arc::new(SystemClock),
            Arc::new(HierarchicalPathResolver::new(&config.directory)),
            Arc::new(LocalFileStore),
        ))
    }

    /// Assemble a cache from explicit parts.
    pub fn with_components(
        db: Arc<CacheDatabase>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn TilePathResolver>,
        files: Arc<dyn TileFileStore>,
    ) -> Self {
        let index = Arc::new(CacheIndex::with_clock(Arc::clone(&db), clock));
        let catalog = RendererCatalog::new(Arc::clone(&db));
        let engine = Arc::new(EvictionEngine::new(
            Arc::clone(&index),
            Arc::clone(&resolver),
            Arc::clone(&files),
        ));

        Self {
            db,
            index,
            catalog,
            resolver,
            files,
            engine,
        }
    }

    /// Store fetched tile bytes.
    ///
    /// Returns the number of bytes newly charged to the cache: `data.len()`
    /// for a new tile, 0 if the tile was already cached (it is touched
    /// instead). Empty data is recorded as an invalid marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the tile file cannot be written. The index is not
    /// modified in that case.
    pub fn store(&self, key: &TileKey, data: &[u8]) -> Result<u64, CacheError> {
        if data.is_empty() {
            self.mark_invalid(key);
            return Ok(0);
        }

        if self.index.touch(key) {
            debug!(tile = %key, "Tile already cached");
            return Ok(0);
        }

        let path = self.resolver.path_for(key);
        self.files.write(&path, data)?;

        Ok(self.index.insert_or_skip(key, data.len() as u64))
    }

    /// Record that `key` could not be fetched, so callers stop retrying it.
    pub fn mark_invalid(&self, key: &TileKey) {
        self.index.insert_or_skip(key, 0);
        debug!(tile = %key, "Tile marked invalid");
    }

    /// Read a cached tile, counting the access.
    ///
    /// Returns `None` for unknown tiles and invalid markers. A row whose file
    /// has vanished is dropped from the index.
    pub fn load(&self, key: &TileKey) -> Option<Vec<u8>> {
        let record = self.index.get(key)?;
        if record.is_invalid() {
            return None;
        }

        let path = self.resolver.path_for(key);
        match self.files.read(&path) {
            Ok(data) => {
                self.index.touch(key);
                Some(data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(tile = %key, path = %path.display(), "Tile file missing, dropping row");
                self.index.remove(key);
                None
            }
            Err(e) => {
                warn!(tile = %key, path = %path.display(), error = %e, "Failed to read tile file");
                None
            }
        }
    }

    /// Returns true if `key` has neither a cached file nor an invalid marker.
    pub fn should_fetch(&self, key: &TileKey) -> bool {
        !self.index.exists(key)
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    pub fn engine(&self) -> &Arc<EvictionEngine> {
        &self.engine
    }

    pub fn catalog(&self) -> &RendererCatalog {
        &self.catalog
    }

    pub fn database(&self) -> &Arc<CacheDatabase> {
        &self.db
    }

    /// Close the index. Later calls degrade to misses and no-ops.
    pub fn close(&self) {
        self.db.close();
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}
