//! TileCache - disk-backed map tile cache with a persistent usage index
//!
//! Tiles are stored as files on disk, one per `(source, zoom, x, y)`. A SQLite
//! index records how often and how recently each tile was used, and how many
//! bytes it occupies, so the cache can be trimmed by usage, by age, or per
//! tile source.
//!
//! # High-Level API
//!
//! ```no_run
//! use tilecache::cache::{CacheConfig, TileCache, TileKey};
//!
//! let cache = TileCache::open(&CacheConfig::default())?;
//! let key = TileKey::new("osm", 12, 2200, 1343);
//!
//! if cache.should_fetch(&key) {
//!     let bytes = vec![0u8; 1024]; // fetched from the tile server
//!     cache.store(&key, &bytes)?;
//! }
//! let tile = cache.load(&key);
//! # Ok::<(), tilecache::cache::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod logging;

/// Version of the tilecache library and CLI.
///
/// Synchronized across the workspace; defined in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
