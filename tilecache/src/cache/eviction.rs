//! Victim selection and coordinated deletion across index and filesystem.
//!
//! Every sweep runs in three phases:
//!
//! 1. select victims from the index (read-only scan)
//! 2. delete each victim's backing file; a missing file is fine, a failed
//!    delete is logged and the sweep continues
//! 3. remove the index rows of the victims whose file is gone (or never
//!    existed, for invalid markers), one row at a time
//!
//! Disk space is released before the index is updated. If phase 3 partially
//! fails, rows with `byte_size > 0` may point at files that no longer exist;
//! [`EvictionEngine::prune_dangling`] cleans those up.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::cache::fs::{DeleteOutcome, TileFileStore};
use crate::cache::index::CacheIndex;
use crate::cache::path::TilePathResolver;
use crate::cache::types::{CacheError, TileRecord};

/// Result of an eviction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Records chosen as victims
    pub tiles_selected: usize,
    /// Backing files removed from disk
    pub files_deleted: usize,
    /// Backing files that were already gone
    pub files_missing: usize,
    /// Backing files that could not be deleted (their rows are kept)
    pub file_delete_failures: usize,
    /// Index rows removed
    pub rows_removed: usize,
    /// Index rows that could not be removed
    pub row_delete_failures: usize,
    /// Sum of `byte_size` over the selected victims
    pub bytes_selected: u64,
    /// Sum of `byte_size` over removed rows (how much `total_bytes` shrank)
    pub bytes_freed: u64,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
}

/// Frees cache space by deleting the least valuable tiles.
pub struct EvictionEngine {
    index: Arc<CacheIndex>,
    resolver: Arc<dyn TilePathResolver>,
    files: Arc<dyn TileFileStore>,
}

impl EvictionEngine {
    /// Create an engine over an index, a path resolver and a file store.
    pub fn new(
        index: Arc<CacheIndex>,
        resolver: Arc<dyn TilePathResolver>,
        files: Arc<dyn TileFileStore>,
    ) -> Self {
        Self {
            index,
            resolver,
            files,
        }
    }

    /// The index this engine evicts from.
    pub fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    /// Evict every tile at the current minimum usage count.
    ///
    /// Ties are not broken by age: the whole tie set goes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyCache`] if the index holds no records.
    pub fn delete_least_used(&self) -> Result<EvictionResult, CacheError> {
        let start = Instant::now();
        if !self.index_available("delete_least_used") {
            return Ok(EvictionResult::default());
        }

        let victims = self.index.least_used_records();
        if victims.is_empty() {
            return Err(CacheError::empty("least-used eviction"));
        }

        let result = self.sweep(victims, start);
        log_eviction_result("least-used", &result);
        Ok(result)
    }

    /// Evict valid tiles oldest-first until at least `target_bytes` have been
    /// selected or no valid tiles remain.
    ///
    /// The oldest tile is always selected, even for a zero target. Selection
    /// stops right after the tile that brings the running total to the target.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyCache`] if no record has `byte_size > 0`.
    /// Nothing is modified in that case.
    pub fn delete_oldest(&self, target_bytes: u64) -> Result<EvictionResult, CacheError> {
        let start = Instant::now();
        if !self.index_available("delete_oldest") {
            return Ok(EvictionResult::default());
        }

        let candidates = self.index.oldest_valid_records();
        if candidates.is_empty() {
            return Err(CacheError::empty("oldest-first eviction"));
        }

        let mut victims = Vec::new();
        let mut selected = 0u64;
        for record in candidates {
            selected += record.byte_size;
            victims.push(record);
            if selected >= target_bytes {
                break;
            }
        }

        if selected < target_bytes {
            warn!(
                target_bytes,
                selected_bytes = selected,
                shortfall_bytes = target_bytes - selected,
                "Oldest-first eviction could not reach target"
            );
        }

        let result = self.sweep(victims, start);
        log_eviction_result("oldest-first", &result);
        Ok(result)
    }

    /// Evict every tile of one source, invalid markers included.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyCache`] if the source has no records.
    pub fn flush_source(&self, source: &str) -> Result<EvictionResult, CacheError> {
        let start = Instant::now();
        if !self.index_available("flush_source") {
            return Ok(EvictionResult::default());
        }

        info!(source, "Flushing cache for source");

        let victims = self.index.records_for_source(source);
        if victims.is_empty() {
            return Err(CacheError::empty(format!("source '{}'", source)));
        }

        let result = self.sweep(victims, start);
        log_eviction_result("flush", &result);
        Ok(result)
    }

    /// Remove rows with `byte_size > 0` whose backing file no longer exists.
    pub fn prune_dangling(&self) -> EvictionResult {
        let start = Instant::now();
        let mut result = EvictionResult::default();

        for record in self.index.oldest_valid_records() {
            let path = self.resolver.path_for(&record.key);
            if self.files.exists(&path) {
                continue;
            }
            result.tiles_selected += 1;
            result.files_missing += 1;
            result.bytes_selected += record.byte_size;
            self.remove_row(&record, &mut result);
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        if result.tiles_selected > 0 {
            log_eviction_result("prune-dangling", &result);
        }
        result
    }

    fn index_available(&self, operation: &'static str) -> bool {
        let open = self.index.database().is_open();
        if !open {
            error!(
                operation,
                fault = "storage_unavailable",
                "Eviction called on closed tile index"
            );
        }
        open
    }

    /// Delete files for `victims`, then drop the rows whose file is gone.
    fn sweep(&self, victims: Vec<TileRecord>, start: Instant) -> EvictionResult {
        let mut result = EvictionResult {
            tiles_selected: victims.len(),
            bytes_selected: victims.iter().map(|r| r.byte_size).sum(),
            ..Default::default()
        };

        let mut removable = Vec::with_capacity(victims.len());
        for record in victims {
            // Invalid markers have no backing file
            if record.is_invalid() {
                removable.push(record);
                continue;
            }

            let path = self.resolver.path_for(&record.key);
            match self.files.delete(&path) {
                Ok(DeleteOutcome::Deleted) => {
                    result.files_deleted += 1;
                    debug!(
                        tile = %record.key,
                        path = %path.display(),
                        bytes = record.byte_size,
                        "Deleted tile file"
                    );
                    removable.push(record);
                }
                Ok(DeleteOutcome::Missing) => {
                    result.files_missing += 1;
                    debug!(
                        tile = %record.key,
                        path = %path.display(),
                        "Tile file already absent"
                    );
                    removable.push(record);
                }
                Err(e) => {
                    result.file_delete_failures += 1;
                    warn!(
                        tile = %record.key,
                        path = %path.display(),
                        fault = "filesystem_delete_failed",
                        error = %e,
                        "Failed to delete tile file, keeping its index row"
                    );
                }
            }
        }

        for record in &removable {
            self.remove_row(record, &mut result);
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn remove_row(&self, record: &TileRecord, result: &mut EvictionResult) {
        match self.index.try_remove(&record.key) {
            Ok(true) => {
                result.rows_removed += 1;
                result.bytes_freed += record.byte_size;
            }
            Ok(false) => {
                debug!(tile = %record.key, "Index row already removed");
            }
            Err(fault) => {
                result.row_delete_failures += 1;
                warn!(
                    tile = %record.key,
                    fault = "index_row_delete_failed",
                    error = %fault,
                    "Failed to remove index row after file deletion"
                );
            }
        }
    }
}

impl std::fmt::Debug for EvictionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionEngine")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

fn log_eviction_result(policy: &'static str, result: &EvictionResult) {
    info!(
        policy,
        tiles_selected = result.tiles_selected,
        files_deleted = result.files_deleted,
        files_missing = result.files_missing,
        file_delete_failures = result.file_delete_failures,
        rows_removed = result.rows_removed,
        row_delete_failures = result.row_delete_failures,
        bytes_freed = result.bytes_freed,
        duration_ms = result.duration_ms,
        "Tile cache eviction complete"
    );
}
