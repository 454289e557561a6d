//! Disk-backed tile cache with a persistent usage index.
//!
//! Tile bytes are stored as files under a per-source directory tree. A SQLite
//! index tracks, per tile, when it was last used, how often and how big it
//! is. Eviction policies pick victims from the index and delete files before
//! rows:
//!
//! - least-used: every tile at the minimum usage count
//! - oldest-first: valid tiles by age until a byte target is reached
//! - source flush: every tile of one source
//!
//! [`BudgetEnforcer`] and [`run_budget_daemon`] keep the cache under its
//! configured size.

mod catalog;
mod clock;
mod daemon;
mod database;
mod eviction;
mod fs;
mod index;
pub mod migrate;
mod path;
mod stats;
mod store;
mod types;

pub use catalog::{RendererCatalog, RendererSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use daemon::{run_budget_daemon, BudgetEnforcer, DEFAULT_TARGET_RATIO};
pub use database::CacheDatabase;
pub use eviction::{EvictionEngine, EvictionResult};
pub use fs::{DeleteOutcome, LocalFileStore, TileFileStore};
pub use index::CacheIndex;
pub use migrate::{MigrationOutcome, SCHEMA_VERSION};
pub use path::{source_directory, HierarchicalPathResolver, TilePathResolver};
pub use stats::{IndexStats, SourceSummary};
pub use store::TileCache;
pub use types::{CacheConfig, CacheError, TileKey, TileRecord};
