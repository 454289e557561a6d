//! Owned handle to the index database.
//!
//! One [`CacheDatabase`] is opened per process and shared (behind `Arc`) by
//! the [`CacheIndex`](crate::cache::CacheIndex) and the
//! [`RendererCatalog`](crate::cache::RendererCatalog). All access goes through
//! a single mutex, which is also the critical section that keeps
//! check-then-insert sequences atomic.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info, warn, Level};

use crate::cache::migrate::{migrate, MigrationOutcome};
use crate::cache::types::CacheError;

/// How long SQLite waits on a locked database file before failing a statement.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a storage call could not run.
#[derive(Debug, Error)]
pub(crate) enum StorageFault {
    /// The handle has been closed.
    #[error("index storage is closed")]
    Unavailable,
    /// SQLite returned an error.
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
}

/// Whether an absorbed fault interrupted a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Index database with an explicit open/close lifecycle.
pub struct CacheDatabase {
    conn: Mutex<Option<Connection>>,
    location: String,
    migration: MigrationOutcome,
}

impl CacheDatabase {
    /// Open (or create) the database file at `path` and migrate its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;

        Self::from_connection(conn, path.display().to_string())
    }

    /// Open a private in-memory database. Mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, ":memory:".to_string())
    }

    fn from_connection(mut conn: Connection, location: String) -> Result<Self, CacheError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let migration = migrate(&mut conn)?;

        info!(location = %location, "Tile index opened");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            location,
            migration,
        })
    }

    /// Close the handle. Later calls through the index or catalog degrade to
    /// "not found" reads and no-op writes.
    pub fn close(&self) {
        if self.conn.lock().take().is_some() {
            info!(location = %self.location, "Tile index closed");
        }
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Where the database lives (file path or `:memory:`).
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Schema migration performed when this handle was opened.
    pub fn migration(&self) -> MigrationOutcome {
        self.migration
    }

    /// Run `op` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StorageFault> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(StorageFault::Unavailable)?;
        Ok(op(conn)?)
    }

    /// Run a read, logging any fault and substituting `fallback`.
    pub(crate) fn read_or<T>(
        &self,
        what: &'static str,
        fallback: T,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> T {
        match self.with_conn(op) {
            Ok(value) => value,
            Err(fault) => {
                log_fault(what, Access::Read, &fault);
                fallback
            }
        }
    }
}

impl std::fmt::Debug for CacheDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDatabase")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Level an absorbed fault is logged at: debug for reads on a closed
/// handle, warn otherwise.
fn fault_level(access: Access, fault: &StorageFault) -> Level {
    match (fault, access) {
        (StorageFault::Unavailable, Access::Read) => Level::DEBUG,
        _ => Level::WARN,
    }
}

/// Log a storage fault that is being absorbed.
pub(crate) fn log_fault(what: &'static str, access: Access, fault: &StorageFault) {
    if fault_level(access, fault) == Level::DEBUG {
        debug!(operation = what, fault = "storage_unavailable", "Tile index closed, skipping");
        return;
    }
    match fault {
        StorageFault::Unavailable => {
            warn!(operation = what, fault = "storage_unavailable", "Tile index closed, write dropped")
        }
        StorageFault::Query(e) => {
            warn!(operation = what, fault = "storage_error", error = %e, "Tile index operation failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory() {
        let db = CacheDatabase::open_in_memory().unwrap();
        assert!(db.is_open());
        assert_eq!(db.location(), ":memory:");
        assert_eq!(db.migration(), MigrationOutcome::Created);
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/tilecache.db");

        let db = CacheDatabase::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(db.migration(), MigrationOutcome::Created);
    }

    #[test]
    fn test_reopen_is_up_to_date() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tilecache.db");

        let db = CacheDatabase::open(&path).unwrap();
        db.close();
        drop(db);

        let db = CacheDatabase::open(&path).unwrap();
        assert_eq!(db.migration(), MigrationOutcome::UpToDate);
    }

    #[test]
    fn test_close_makes_storage_unavailable() {
        let db = CacheDatabase::open_in_memory().unwrap();
        db.close();

        assert!(!db.is_open());
        let result = db.with_conn(|conn| conn.execute_batch("SELECT 1"));
        assert!(matches!(result, Err(StorageFault::Unavailable)));
    }

    #[test]
    fn test_close_twice_is_harmless() {
        let db = CacheDatabase::open_in_memory().unwrap();
        db.close();
        db.close();
        assert!(!db.is_open());
    }

    #[test]
    fn test_read_or_returns_fallback_when_closed() {
        let db = CacheDatabase::open_in_memory().unwrap();
        db.close();

        let value = db.read_or("count", 42i64, |conn| {
            conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_read_or_returns_fallback_on_query_error() {
        let db = CacheDatabase::open_in_memory().unwrap();

        let value = db.read_or("bad query", -1i64, |conn| {
            conn.query_row("SELECT COUNT(*) FROM no_such_table", [], |row| row.get(0))
        });
        assert_eq!(value, -1);
    }

    #[test]
    fn test_closed_handle_warns_on_write_only() {
        let closed = StorageFault::Unavailable;
        assert_eq!(fault_level(Access::Read, &closed), Level::DEBUG);
        assert_eq!(fault_level(Access::Write, &closed), Level::WARN);

        let failed = StorageFault::from(rusqlite::Error::InvalidQuery);
        assert_eq!(fault_level(Access::Read, &failed), Level::WARN);
        assert_eq!(fault_level(Access::Write, &failed), Level::WARN);
    }

    #[test]
    fn test_storage_fault_display() {
        assert_eq!(StorageFault::Unavailable.to_string(), "index storage is closed");
        assert_eq!(
            StorageFault::from(rusqlite::Error::InvalidQuery).to_string(),
            rusqlite::Error::InvalidQuery.to_string()
        );
    }
}
