//! Versioned schema for the cache index database.
//!
//! The schema version lives in `PRAGMA user_version`. A fresh database gets
//! both tables. Any other version mismatch drops and recreates the tile table:
//! tile usage data is sacrificed, renderer rows survive because the renderer
//! table is only created if missing.

use rusqlite::Connection;
use tracing::{info, warn};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_TILES: &str = "
    CREATE TABLE IF NOT EXISTS tiles (
        source      TEXT    NOT NULL,
        zoom        INTEGER NOT NULL,
        x           INTEGER NOT NULL,
        y           INTEGER NOT NULL,
        timestamp   INTEGER NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 1,
        byte_size   INTEGER NOT NULL,
        PRIMARY KEY (source, zoom, x, y)
    );
    CREATE INDEX IF NOT EXISTS tiles_by_timestamp ON tiles (timestamp);
    CREATE INDEX IF NOT EXISTS tiles_by_usage ON tiles (usage_count);
";

const CREATE_RENDERERS: &str = "
    CREATE TABLE IF NOT EXISTS renderers (
        id            TEXT    PRIMARY KEY,
        name          TEXT,
        base_url      TEXT,
        zoom_min      INTEGER NOT NULL,
        zoom_max      INTEGER NOT NULL,
        tile_size_log INTEGER NOT NULL
    );
";

/// What [`migrate`] did to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fresh database, both tables created.
    Created,
    /// Already at [`SCHEMA_VERSION`].
    UpToDate,
    /// Tile table dropped and recreated from an incompatible version.
    Rebuilt { from: i32 },
}

/// Bring the database to [`SCHEMA_VERSION`].
///
/// Runs inside a single transaction: either the schema and version stamp are
/// both updated or neither is.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<MigrationOutcome> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    let tx = conn.transaction()?;

    let outcome = if version == SCHEMA_VERSION {
        MigrationOutcome::UpToDate
    } else if version == 0 {
        tx.execute_batch(CREATE_RENDERERS)?;
        tx.execute_batch(CREATE_TILES)?;
        MigrationOutcome::Created
    } else {
        warn!(
            from = version,
            to = SCHEMA_VERSION,
            "Upgrading tile index schema, which will destroy all cached tile records"
        );
        tx.execute_batch("DROP TABLE IF EXISTS tiles;")?;
        tx.execute_batch(CREATE_RENDERERS)?;
        tx.execute_batch(CREATE_TILES)?;
        MigrationOutcome::Rebuilt { from: version }
    };

    if outcome != MigrationOutcome::UpToDate {
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    tx.commit()?;

    info!(version = SCHEMA_VERSION, outcome = ?outcome, "Tile index schema ready");
    Ok(outcome)
}
