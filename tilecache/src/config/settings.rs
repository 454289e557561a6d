//! Settings structs for each configuration section.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Cache settings
    pub cache: CacheSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Root directory for tile files and the index database
    pub directory: PathBuf,
    /// Index database file name inside `directory`
    pub index_file: String,
    /// Maximum cached bytes
    pub max_size: u64,
    /// Seconds between budget checks
    pub gc_interval: u64,
    /// Percentage of `max_size` to evict down to
    pub eviction_target_percent: u8,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory for log files
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
    /// Level used when RUST_LOG is not set
    pub level: String,
}
