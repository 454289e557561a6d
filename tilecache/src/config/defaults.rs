//! Default values for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::cache::CacheConfig;

/// Default index database file name.
pub const DEFAULT_INDEX_FILE: &str = "tilecache.db";

/// Default maximum cache size (2 GB).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default seconds between budget checks.
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 60;

/// Default eviction target as a percentage of the maximum size.
pub const DEFAULT_EVICTION_TARGET_PERCENT: u8 = 90;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log levels accepted in `[logging] level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Platform cache directory for tiles (e.g. `~/.cache/tilecache` on Linux).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilecache")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: default_cache_directory(),
                index_file: DEFAULT_INDEX_FILE.to_string(),
                max_size: DEFAULT_MAX_CACHE_SIZE,
                gc_interval: DEFAULT_GC_INTERVAL_SECS,
                eviction_target_percent: DEFAULT_EVICTION_TARGET_PERCENT,
            },
            logging: LoggingSettings {
                directory: config_directory().join("logs"),
                file: crate::logging::DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Runtime cache configuration from the `[cache]` section.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            directory: self.cache.directory.clone(),
            index_file: self.cache.index_file.clone(),
            max_size_bytes: self.cache.max_size,
            gc_interval_secs: self.cache.gc_interval,
            target_percent: self.cache.eviction_target_percent,
        }
    }
}
