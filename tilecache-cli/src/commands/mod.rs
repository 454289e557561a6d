//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`cache`] - Index inspection and eviction (stats, evict, enforce, flush, prune, watch)
//! - [`config`] - Configuration file management (path, init)
//! - [`sources`] - Renderer catalog management (list, add, remove)

pub mod cache;
pub mod config;
pub mod sources;

use tilecache::cache::TileCache;
use tilecache::config::ConfigFile;

use crate::error::CliError;

/// Open the tile cache described by the `[cache]` section.
pub fn open_cache(config: &ConfigFile) -> Result<TileCache, CliError> {
    TileCache::open(&config.cache_config()).map_err(CliError::CacheOpen)
}
