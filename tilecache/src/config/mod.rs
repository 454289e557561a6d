//! User configuration loaded from `~/.tilecache/config.ini`.
//!
//! # Example
//!
//! ```no_run
//! use tilecache::cache::TileCache;
//! use tilecache::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let cache = TileCache::open(&config.cache_config())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{
    default_cache_directory, DEFAULT_EVICTION_TARGET_PERCENT, DEFAULT_GC_INTERVAL_SECS,
    DEFAULT_INDEX_FILE, DEFAULT_LOG_LEVEL, DEFAULT_MAX_CACHE_SIZE,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, ConfigFile, LoggingSettings};
pub use size::{format_size, format_size_approx, parse_size, SizeParseError};
