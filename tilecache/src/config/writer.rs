//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[cache]
; Root directory for tile files and the index database.
; Tiles are stored as <directory>/<source>/<zoom>/<x>/<y>.tile
directory = {}
; Index database file name inside the cache directory
index_file = {}
; Maximum cache size before the oldest tiles are evicted (default: 2GB)
; Supports: KB, MB, GB, TB suffixes (e.g., 500MB, 2GB, 20GB)
max_size = {}
; Seconds between cache size checks (default: 60)
gc_interval = {}
; When over max_size, evict down to this percentage of it (default: 90)
eviction_target_percent = {}

[logging]
; Directory for log files
directory = {}
; Log file name (truncated at every start)
file = {}
; Log level when RUST_LOG is not set: trace, debug, info, warn, error
level = {}
"#,
        path_to_string(&config.cache.directory),
        config.cache.index_file,
        format_size(config.cache.max_size),
        config.cache.gc_interval,
        config.cache.eviction_target_percent,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
    )
}

/// Render a path, abbreviating the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
