//! Usage index over cached tiles.
//!
//! The index records, per tile key, when the tile was last used, how often it
//! has been used, and how many bytes its backing file takes. Callers consult it
//! before fetching (`exists`, `is_invalid`), after fetching (`insert_or_skip`)
//! and when deciding whether eviction is needed (`total_bytes`).
//!
//! # Failure policy
//!
//! Usage bookkeeping must never block tile serving. Storage faults are logged
//! and reads fall back to "not found" / zero, writes to no-ops. Nothing in this
//! module returns an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::database::{log_fault, Access, CacheDatabase, StorageFault};
use crate::cache::stats::{IndexStats, SourceSummary};
use crate::cache::types::{TileKey, TileRecord};

const RECORD_COLUMNS: &str = "source, zoom, x, y, timestamp, usage_count, byte_size";

const WHERE_KEY: &str = "source = ?1 AND zoom = ?2 AND x = ?3 AND y = ?4";

const TOUCH_SQL: &str = "UPDATE tiles
    SET usage_count = MIN(usage_count + 1, 4294967295),
        timestamp = MAX(timestamp, ?5)
    WHERE source = ?1 AND zoom = ?2 AND x = ?3 AND y = ?4";

const INSERT_SQL: &str = "INSERT INTO tiles (source, zoom, x, y, timestamp, usage_count, byte_size)
    VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)";

/// Thread-safe tile usage index.
///
/// Cheap to share: wrap in `Arc` and hand to every fetch worker.
pub struct CacheIndex {
    db: Arc<CacheDatabase>,
    clock: Arc<dyn Clock>,
}

impl CacheIndex {
    /// Create an index over `db` using the wall clock.
    pub fn new(db: Arc<CacheDatabase>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// Create an index with an injected clock.
    pub fn with_clock(db: Arc<CacheDatabase>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Underlying database handle.
    pub fn database(&self) -> &Arc<CacheDatabase> {
        &self.db
    }

    /// Returns true if a record for `key` is present, valid or not.
    pub fn exists(&self, key: &TileKey) -> bool {
        self.db.read_or("exists", false, |conn| {
            conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM tiles WHERE {})", WHERE_KEY),
                params![key.source, key.zoom, key.x, key.y],
                |row| row.get(0),
            )
        })
    }

    /// Alias for [`exists`](Self::exists).
    pub fn has_tile(&self, key: &TileKey) -> bool {
        self.exists(key)
    }

    /// Returns true if `key` is present as an invalid marker (`byte_size == 0`).
    pub fn is_invalid(&self, key: &TileKey) -> bool {
        self.db.read_or("is_invalid", false, |conn| {
            conn.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM tiles WHERE {} AND byte_size = 0)",
                    WHERE_KEY
                ),
                params![key.source, key.zoom, key.x, key.y],
                |row| row.get(0),
            )
        })
    }

    /// Fetch the record for `key`.
    pub fn get(&self, key: &TileKey) -> Option<TileRecord> {
        self.db.read_or("get", None, |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM tiles WHERE {}",
                RECORD_COLUMNS, WHERE_KEY
            ))?;
            let mut rows =
                stmt.query_map(params![key.source, key.zoom, key.x, key.y], record_from_row)?;
            rows.next().transpose()
        })
    }

    /// Record a hit: bump `usage_count` and refresh `timestamp`.
    ///
    /// Returns whether a record was found and updated. The timestamp never
    /// moves backwards, even if the clock does.
    pub fn touch(&self, key: &TileKey) -> bool {
        let now = to_millis(self.clock.now());
        match self.db.with_conn(|conn| touch_row(conn, key, now)) {
            Ok(updated) => updated,
            Err(fault) => {
                log_fault("touch", Access::Write, &fault);
                false
            }
        }
    }

    /// Touch `key` if present, otherwise insert it.
    ///
    /// Returns the bytes newly charged to the cache budget: 0 for a repeat hit,
    /// `byte_size` for a new record. Pass `byte_size = 0` to record a failed
    /// fetch as an invalid marker.
    ///
    /// The touch and the insert run in one transaction under the database
    /// lock, so two concurrent callers can never both insert the same key.
    pub fn insert_or_skip(&self, key: &TileKey, byte_size: u64) -> u64 {
        let now = to_millis(self.clock.now());
        let result = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let existed = touch_row(&tx, key, now)?;
            if !existed {
                tx.execute(
                    INSERT_SQL,
                    params![key.source, key.zoom, key.x, key.y, now, to_sql_size(byte_size)],
                )?;
            }
            tx.commit()?;
            Ok(existed)
        });

        match result {
            Ok(true) => {
                debug!(tile = %key, "Tile existed");
                0
            }
            Ok(false) => {
                debug!(tile = %key, bytes = byte_size, "Tile added to index");
                byte_size
            }
            Err(fault) => {
                log_fault("insert_or_skip", Access::Write, &fault);
                0
            }
        }
    }

    /// Sum of `byte_size` over all records. 0 when empty or unavailable.
    pub fn total_bytes(&self) -> u64 {
        self.db.read_or("total_bytes", 0, |conn| {
            conn.query_row("SELECT COALESCE(SUM(byte_size), 0) FROM tiles", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(from_sql_size)
        })
    }

    /// Delete the record for `key`. Returns whether a row was removed.
    pub fn remove(&self, key: &TileKey) -> bool {
        match self.try_remove(key) {
            Ok(removed) => removed,
            Err(fault) => {
                log_fault("remove", Access::Write, &fault);
                false
            }
        }
    }

    /// Delete the record for `key`, reporting faults to the caller.
    pub(crate) fn try_remove(&self, key: &TileKey) -> Result<bool, StorageFault> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                &format!("DELETE FROM tiles WHERE {}", WHERE_KEY),
                params![key.source, key.zoom, key.x, key.y],
            )?;
            Ok(deleted > 0)
        })
    }

    /// All records whose `usage_count` equals the current minimum.
    ///
    /// This is the tie set at the minimum, not a full ranking. No ordering
    /// within the set is guaranteed.
    pub fn least_used_records(&self) -> Vec<TileRecord> {
        self.query_records(
            "least_used_records",
            &format!(
                "SELECT {} FROM tiles WHERE usage_count = (SELECT MIN(usage_count) FROM tiles)",
                RECORD_COLUMNS
            ),
            &[],
        )
    }

    /// All valid records (`byte_size > 0`), oldest timestamp first. Records
    /// sharing a timestamp come back in insertion order.
    pub fn oldest_valid_records(&self) -> Vec<TileRecord> {
        self.query_records(
            "oldest_valid_records",
            &format!(
                "SELECT {} FROM tiles WHERE byte_size > 0 ORDER BY timestamp ASC, rowid ASC",
                RECORD_COLUMNS
            ),
            &[],
        )
    }

    /// Every record of one source, invalid markers included, oldest first.
    pub fn records_for_source(&self, source: &str) -> Vec<TileRecord> {
        self.query_records(
            "records_for_source",
            &format!(
                "SELECT {} FROM tiles WHERE source = ?1 ORDER BY timestamp ASC, rowid ASC",
                RECORD_COLUMNS
            ),
            &[&source],
        )
    }

    /// Number of records.
    pub fn len(&self) -> u64 {
        self.db.read_or("len", 0, |conn| {
            conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get::<_, i64>(0))
                .map(from_sql_size)
        })
    }

    /// Returns true if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate counts, overall and per source.
    pub fn stats(&self) -> IndexStats {
        self.db.read_or("stats", IndexStats::default(), |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT source,
                        COUNT(*),
                        SUM(CASE WHEN byte_size = 0 THEN 1 ELSE 0 END),
                        COALESCE(SUM(byte_size), 0)
                 FROM tiles GROUP BY source ORDER BY source",
            )?;
            let sources = stmt
                .query_map([], |row| {
                    Ok(SourceSummary {
                        source: row.get(0)?,
                        entries: from_sql_size(row.get(1)?),
                        invalid_entries: from_sql_size(row.get(2)?),
                        total_bytes: from_sql_size(row.get(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(IndexStats::from_sources(sources))
        })
    }

    fn query_records(
        &self,
        what: &'static str,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Vec<TileRecord> {
        self.db.read_or(what, Vec::new(), |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(args, record_from_row)?;
            rows.collect()
        })
    }
}

impl std::fmt::Debug for CacheIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheIndex").field("db", &self.db).finish()
    }
}

fn touch_row(conn: &Connection, key: &TileKey, now: i64) -> rusqlite::Result<bool> {
    let updated = conn.execute(TOUCH_SQL, params![key.source, key.zoom, key.x, key.y, now])?;
    Ok(updated > 0)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TileRecord> {
    Ok(TileRecord {
        key: TileKey {
            source: row.get(0)?,
            zoom: row.get(1)?,
            x: row.get(2)?,
            y: row.get(3)?,
        },
        timestamp: from_millis(row.get(4)?),
        usage_count: row.get(5)?,
        byte_size: from_sql_size(row.get(6)?),
    })
}

fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn to_sql_size(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

fn from_sql_size(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use chrono::Duration;
    use proptest::prelude::*;

    fn create_index() -> (CacheIndex, Arc<ManualClock>) {
        let db = Arc::new(CacheDatabase::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::default());
        let index = CacheIndex::with_clock(db, clock.clone());
        (index, clock)
    }

    fn key(x: u32, y: u32) -> TileKey {
        TileKey::new("osm", 3, x, y)
    }

    #[test]
    fn test_empty_index() {
        let (index, _) = create_index();

        assert!(index.is_empty());
        assert_eq!(index.total_bytes(), 0);
        assert!(!index.exists(&key(4, 5)));
        assert!(!index.is_invalid(&key(4, 5)));
        assert!(index.least_used_records().is_empty());
        assert!(index.oldest_valid_records().is_empty());
    }

    #[test]
    fn test_insert_new_tile_charges_bytes() {
        let (index, clock) = create_index();

        assert_eq!(index.insert_or_skip(&key(4, 5), 1200), 1200);

        let record = index.get(&key(4, 5)).unwrap();
        assert_eq!(record.usage_count, 1);
        assert_eq!(record.byte_size, 1200);
        assert_eq!(record.timestamp, clock.now());
        assert!(index.exists(&key(4, 5)));
        assert!(!index.is_invalid(&key(4, 5)));
    }

    #[test]
    fn test_repeat_insert_charges_nothing() {
        let (index, _) = create_index();

        assert_eq!(index.insert_or_skip(&key(4, 5), 1200), 1200);
        assert_eq!(index.insert_or_skip(&key(4, 5), 1200), 0);
        assert_eq!(index.insert_or_skip(&key(4, 5), 999), 0);

        let record = index.get(&key(4, 5)).unwrap();
        assert_eq!(record.usage_count, 3);
        assert_eq!(record.byte_size, 1200);
        assert_eq!(index.len(), 1);
        assert_eq!(index.total_bytes(), 1200);
    }

    #[test]
    fn test_total_bytes_sums_records() {
        let (index, _) = create_index();

        index.insert_or_skip(&key(4, 5), 1200);
        assert_eq!(index.total_bytes(), 1200);

        index.insert_or_skip(&key(4, 6), 800);
        assert_eq!(index.total_bytes(), 2000);
    }

    #[test]
    fn test_invalid_marker() {
        let (index, _) = create_index();
        let tile = TileKey::new("osm", 1, 0, 0);
        index.insert_or_skip(&key(4, 5), 1200);

        assert_eq!(index.insert_or_skip(&tile, 0), 0);

        assert!(index.is_invalid(&tile));
        assert!(index.has_tile(&tile));
        assert_eq!(index.total_bytes(), 1200);
    }

    #[test]
    fn test_invalid_marker_twice_leaves_one_record() {
        let (index, _) = create_index();
        let tile = TileKey::new("osm", 1, 0, 0);

        index.insert_or_skip(&tile, 0);
        index.insert_or_skip(&tile, 0);

        assert_eq!(index.len(), 1);
        assert!(index.is_invalid(&tile));
        assert!(index.exists(&tile));
        assert_eq!(index.get(&tile).unwrap().byte_size, 0);
    }

    #[test]
    fn test_touch_missing_key() {
        let (index, _) = create_index();
        assert!(!index.touch(&key(1, 1)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_touch_updates_usage_and_timestamp() {
        let (index, clock) = create_index();
        index.insert_or_skip(&key(4, 5), 100);
        let before = index.get(&key(4, 5)).unwrap();

        clock.advance(Duration::seconds(10));
        assert!(index.touch(&key(4, 5)));

        let after = index.get(&key(4, 5)).unwrap();
        assert_eq!(after.usage_count, before.usage_count + 1);
        assert_eq!(after.timestamp, before.timestamp + Duration::seconds(10));
    }

    #[test]
    fn test_touch_never_moves_timestamp_backwards() {
        let (index, clock) = create_index();
        index.insert_or_skip(&key(4, 5), 100);
        let before = index.get(&key(4, 5)).unwrap();

        clock.advance(Duration::seconds(-60));
        assert!(index.touch(&key(4, 5)));

        let after = index.get(&key(4, 5)).unwrap();
        assert_eq!(after.timestamp, before.timestamp);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (index, _) = create_index();
        index.insert_or_skip(&key(4, 5), 100);

        assert!(index.remove(&key(4, 5)));
        assert!(!index.remove(&key(4, 5)));
        assert!(!index.exists(&key(4, 5)));
        assert_eq!(index.total_bytes(), 0);
    }

    #[test]
    fn test_least_used_returns_tie_set_at_minimum() {
        let (index, _) = create_index();
        index.insert_or_skip(&key(0, 0), 100);
        index.insert_or_skip(&key(0, 1), 100);
        index.insert_or_skip(&key(0, 2), 100);
        index.touch(&key(0, 2));

        let mut victims: Vec<_> = index
            .least_used_records()
            .into_iter()
            .map(|r| r.key)
            .collect();
        victims.sort();

        assert_eq!(victims, vec![key(0, 0), key(0, 1)]);
    }

    #[test]
    fn test_least_used_includes_invalid_markers() {
        let (index, _) = create_index();
        index.insert_or_skip(&key(0, 0), 0);

        let victims = index.least_used_records();
        assert_eq!(victims.len(), 1);
        assert!(victims[0].is_invalid());
    }

    #[test]
    fn test_oldest_valid_records_order_and_filter() {
        let (index, clock) = create_index();
        index.insert_or_skip(&key(0, 2), 300);
        clock.advance(Duration::seconds(1));
        index.insert_or_skip(&key(0, 0), 0);
        clock.advance(Duration::seconds(1));
        index.insert_or_skip(&key(0, 1), 100);
        clock.advance(Duration::seconds(1));
        index.touch(&key(0, 2));

        let order: Vec<_> = index
            .oldest_valid_records()
            .into_iter()
            .map(|r| r.key)
            .collect();

        assert_eq!(order, vec![key(0, 1), key(0, 2)]);
    }

    #[test]
    fn test_same_timestamp_keeps_insertion_order() {
        let (index, _) = create_index();
        let inserted = vec![key(9, 9), key(5, 5), key(0, 0), key(7, 1)];
        for k in &inserted {
            index.insert_or_skip(k, 10);
        }

        let oldest: Vec<_> = index
            .oldest_valid_records()
            .into_iter()
            .map(|r| r.key)
            .collect();
        let by_source: Vec<_> = index
            .records_for_source("osm")
            .into_iter()
            .map(|r| r.key)
            .collect();

        assert_eq!(oldest, inserted);
        assert_eq!(by_source, inserted);
    }

    #[test]
    fn test_records_for_source_includes_invalid() {
        let (index, clock) = create_index();
        index.insert_or_skip(&TileKey::new("osm", 1, 0, 0), 0);
        clock.advance(Duration::seconds(1));
        index.insert_or_skip(&TileKey::new("osm", 1, 0, 1), 500);
        index.insert_or_skip(&TileKey::new("bing", 1, 0, 0), 500);

        let records = index.records_for_source("osm");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_invalid());
        assert_eq!(records[1].byte_size, 500);
        assert!(records.iter().all(|r| r.key.source == "osm"));
        assert!(index.records_for_source("mapnik").is_empty());
    }

    #[test]
    fn test_stats() {
        let (index, _) = create_index();
        index.insert_or_skip(&TileKey::new("osm", 1, 0, 0), 0);
        index.insert_or_skip(&TileKey::new("osm", 1, 0, 1), 500);
        index.insert_or_skip(&TileKey::new("bing", 1, 0, 0), 700);

        let stats = index.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.invalid_entries, 1);
        assert_eq!(stats.total_bytes, 1200);
        assert_eq!(stats.sources.len(), 2);
        assert_eq!(stats.sources[0].source, "bing");
        assert_eq!(stats.sources[1].entries, 2);
    }

    #[test]
    fn test_closed_index_degrades_quietly() {
        let (index, _) = create_index();
        index.insert_or_skip(&key(4, 5), 100);
        index.database().close();

        assert!(!index.exists(&key(4, 5)));
        assert!(!index.is_invalid(&key(4, 5)));
        assert!(!index.touch(&key(4, 5)));
        assert_eq!(index.insert_or_skip(&key(4, 6), 100), 0);
        assert!(!index.remove(&key(4, 5)));
        assert_eq!(index.total_bytes(), 0);
        assert!(index.oldest_valid_records().is_empty());
        assert!(index.least_used_records().is_empty());
        assert!(index.records_for_source("osm").is_empty());
        assert_eq!(index.stats(), IndexStats::default());
    }

    #[test]
    fn test_concurrent_insert_charges_once() {
        let (index, _) = create_index();
        let index = Arc::new(index);
        let tile = key(7, 7);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let index = Arc::clone(&index);
                let tile = tile.clone();
                std::thread::spawn(move || index.insert_or_skip(&tile, 4096))
            })
            .collect();

        let charged: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(charged, 4096);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&tile).unwrap().usage_count, 16);
    }

    #[test]
    fn test_index_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CacheIndex>();
    }

    proptest! {
        /// Property: only the first insert of a key charges bytes, and each key
        /// ends with exactly one record whose usage count matches its calls.
        #[test]
        fn prop_charge_once_and_unique(
            ops in proptest::collection::vec((0u32..4, 0u32..4, 0u64..5000), 1..60)
        ) {
            let (index, _) = create_index();
            let mut first_size = std::collections::HashMap::new();
            let mut calls = std::collections::HashMap::new();

            for (x, y, size) in &ops {
                let tile = key(*x, *y);
                let charged = index.insert_or_skip(&tile, *size);
                match first_size.get(&tile) {
                    None => {
                        prop_assert_eq!(charged, *size);
                        first_size.insert(tile.clone(), *size);
                    }
                    Some(_) => prop_assert_eq!(charged, 0),
                }
                *calls.entry(tile).or_insert(0u32) += 1;
            }

            prop_assert_eq!(index.len(), first_size.len() as u64);
            prop_assert_eq!(index.total_bytes(), first_size.values().sum::<u64>());
            for (tile, count) in &calls {
                let record = index.get(tile).unwrap();
                prop_assert_eq!(record.usage_count, *count);
                prop_assert_eq!(record.byte_size, first_size[tile]);
            }
        }

        /// Property: touch never decreases usage or timestamp, whatever the clock does.
        #[test]
        fn prop_touch_is_monotonic(steps in proptest::collection::vec(-100i64..100, 1..30)) {
            let (index, clock) = create_index();
            let tile = key(1, 2);
            index.insert_or_skip(&tile, 10);

            let mut previous = index.get(&tile).unwrap();
            for step in steps {
                clock.advance(Duration::seconds(step));
                prop_assert!(index.touch(&tile));
                let current = index.get(&tile).unwrap();
                prop_assert!(current.usage_count > previous.usage_count);
                prop_assert!(current.timestamp >= previous.timestamp);
                previous = current;
            }
        }
    }
}
