//! Core types for the tile cache index.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Key uniquely identifying one cached tile.
///
/// Used as the index primary key and as the input for path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Source (renderer) identifier, e.g. "osm" or "bing"
    pub source: String,
    /// Zoom level
    pub zoom: u8,
    /// Tile column
    pub x: u32,
    /// Tile row
    pub y: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(source: impl Into<String>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            zoom,
            x,
            y,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.zoom, self.x, self.y)
    }
}

/// Usage metadata tracked for one cached tile.
///
/// A `byte_size` of zero marks a tile whose fetch failed. The row stops
/// repeated retries without claiming a cached file exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    /// Tile identity
    pub key: TileKey,
    /// Last time the tile was inserted or hit
    pub timestamp: DateTime<Utc>,
    /// Number of inserts and hits, starting at 1
    pub usage_count: u32,
    /// Size of the backing file in bytes (0 = invalid marker)
    pub byte_size: u64,
}

impl TileRecord {
    /// Returns true if this record is an invalid marker.
    pub fn is_invalid(&self) -> bool {
        self.byte_size == 0
    }
}

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Eviction was asked to free space or flush a source with nothing eligible
    #[error("Cache seems to be empty: no eligible tiles for {scope}")]
    EmptyCache { scope: String },

    /// SQLite error while opening or migrating the index
    #[error("Cache index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O error during cache operations
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    pub(crate) fn empty(scope: impl Into<String>) -> Self {
        CacheError::EmptyCache {
            scope: scope.into(),
        }
    }

    /// Returns true for the `EmptyCache` variant.
    pub fn is_empty_cache(&self) -> bool {
        matches!(self, CacheError::EmptyCache { .. })
    }
}

/// Runtime configuration for a tile cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding tile files
    pub directory: PathBuf,
    /// Index database file name, relative to `directory`
    pub index_file: String,
    /// Maximum cached bytes before budget enforcement evicts (default: 2 GB)
    pub max_size_bytes: u64,
    /// Budget daemon check interval in seconds (default: 60)
    pub gc_interval_secs: u64,
    /// Percentage of `max_size_bytes` to evict down to (default: 90)
    pub target_percent: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilecache");

        Self {
            directory,
            index_file: "tilecache.db".to_string(),
            max_size_bytes: 2 * 1024 * 1024 * 1024, // 2 GB
            gc_interval_secs: 60,
            target_percent: 90,
        }
    }
}

impl CacheConfig {
    /// Full path of the index database.
    pub fn index_path(&self) -> PathBuf {
        self.directory.join(&self.index_file)
    }

    /// Set cache directory.
    pub fn with_directory(mut self, dir: PathBuf) -> Self {
        self.directory = dir;
        self
    }

    /// Set maximum cache size in bytes.
    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_size_bytes = size;
        self
    }

    /// Set eviction target percentage.
    pub fn with_target_percent(mut self, percent: u8) -> Self {
        self.target_percent = percent;
        self
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.target_percent == 0 || self.target_percent > 100 {
            return Err(CacheError::InvalidConfig(format!(
                "target_percent must be in 1..=100, got {}",
                self.target_percent
            )));
        }
        if self.index_file.trim().is_empty() {
            return Err(CacheError::InvalidConfig(
                "index_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
