//! Renderer (tile source) metadata.
//!
//! Rows are managed by configuration, not by cache pressure, and are never
//! evicted. Tile records do not reference this table: a tile whose source has
//! no catalog entry is still a valid tile.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, warn};

use crate::cache::database::{log_fault, Access, CacheDatabase};

/// Display metadata and zoom bounds for one tile source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSource {
    /// Source identifier, matching `TileKey::source`
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// URL prefix tiles are fetched from
    pub base_url: String,
    /// Lowest zoom level served
    pub zoom_min: u8,
    /// Highest zoom level served
    pub zoom_max: u8,
    /// log2 of the tile edge in pixels (8 = 256px)
    pub tile_size_log: u8,
}

impl RendererSource {
    /// Returns true if `zoom` lies within this source's bounds.
    pub fn supports_zoom(&self, zoom: u8) -> bool {
        (self.zoom_min..=self.zoom_max).contains(&zoom)
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        1u32.checked_shl(self.tile_size_log as u32).unwrap_or(0)
    }
}

/// Keyed store of [`RendererSource`] rows sharing the index database.
#[derive(Debug)]
pub struct RendererCatalog {
    db: Arc<CacheDatabase>,
}

impl RendererCatalog {
    /// Create a catalog over an open database.
    pub fn new(db: Arc<CacheDatabase>) -> Self {
        Self { db }
    }

    /// Insert or replace a source. Returns false if the row was rejected
    /// (inverted zoom bounds) or could not be written.
    pub fn upsert(&self, source: &RendererSource) -> bool {
        if source.zoom_min > source.zoom_max {
            warn!(
                id = %source.id,
                zoom_min = source.zoom_min,
                zoom_max = source.zoom_max,
                "Rejecting renderer with inverted zoom bounds"
            );
            return false;
        }

        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO renderers (id, name, base_url, zoom_min, zoom_max, tile_size_log)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    base_url = excluded.base_url,
                    zoom_min = excluded.zoom_min,
                    zoom_max = excluded.zoom_max,
                    tile_size_log = excluded.tile_size_log",
                params![
                    source.id,
                    source.name,
                    source.base_url,
                    source.zoom_min,
                    source.zoom_max,
                    source.tile_size_log
                ],
            )
        });

        match result {
            Ok(_) => {
                info!(id = %source.id, name = %source.name, "Renderer saved");
                true
            }
            Err(fault) => {
                log_fault("renderer_upsert", Access::Write, &fault);
                false
            }
        }
    }

    /// Look up one source.
    pub fn get(&self, id: &str) -> Option<RendererSource> {
        self.db.read_or("renderer_get", None, |conn| {
            conn.query_row(
                "SELECT id, name, base_url, zoom_min, zoom_max, tile_size_log
                 FROM renderers WHERE id = ?1",
                [id],
                source_from_row,
            )
            .optional()
        })
    }

    /// All sources ordered by id.
    pub fn list(&self) -> Vec<RendererSource> {
        self.db.read_or("renderer_list", Vec::new(), |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, base_url, zoom_min, zoom_max, tile_size_log
                 FROM renderers ORDER BY id",
            )?;
            let rows = stmt.query_map([], source_from_row)?;
            rows.collect()
        })
    }

    /// Delete a source. Its cached tiles are left alone.
    pub fn remove(&self, id: &str) -> bool {
        match self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM renderers WHERE id = ?1", [id]))
        {
            Ok(deleted) => deleted > 0,
            Err(fault) => {
                log_fault("renderer_remove", Access::Write, &fault);
                false
            }
        }
    }

    /// Returns true if `id` is known and serves `zoom`.
    pub fn supports_zoom(&self, id: &str, zoom: u8) -> bool {
        self.get(id).is_some_and(|source| source.supports_zoom(zoom))
    }
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<RendererSource> {
    Ok(RendererSource {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        base_url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        zoom_min: row.get(3)?,
        zoom_max: row.get(4)?,
        tile_size_log: row.get(5)?,
    })
}
