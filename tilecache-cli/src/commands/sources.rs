//! Renderer catalog management commands.

use clap::Subcommand;
use tilecache::cache::{RendererSource, TileCache};

use crate::error::CliError;

/// Sources action subcommands.
#[derive(Debug, Subcommand)]
pub enum SourcesAction {
    /// List registered tile sources
    List,
    /// Register or update a tile source
    Add {
        /// Source identifier used in tile keys (e.g. "osm")
        id: String,
        /// Display name
        #[arg(long, default_value = "")]
        name: String,
        /// Base URL tiles are fetched from
        #[arg(long, default_value = "")]
        url: String,
        /// Lowest zoom level served
        #[arg(long, default_value_t = 0)]
        zoom_min: u8,
        /// Highest zoom level served
        #[arg(long, default_value_t = 19)]
        zoom_max: u8,
        /// log2 of the tile edge in pixels (8 = 256px)
        #[arg(long, default_value_t = 8)]
        tile_size_log: u8,
    },
    /// Remove a tile source (its cached tiles are kept)
    Remove {
        /// Source identifier
        id: String,
    },
}

/// Run a sources subcommand.
pub fn run(cache: &TileCache, action: SourcesAction) -> Result<(), CliError> {
    let catalog = cache.catalog();

    match action {
        SourcesAction::List => {
            let sources = catalog.list();
            if sources.is_empty() {
                println!("No tile sources registered");
                return Ok(());
            }
            println!("{:<12} {:<24} {:>6} {:>6}  URL", "ID", "NAME", "ZOOM", "TILE");
            for source in sources {
                println!(
                    "{:<12} {:<24} {:>6} {:>6}  {}",
                    source.id,
                    source.name,
                    format!("{}-{}", source.zoom_min, source.zoom_max),
                    source.tile_size(),
                    source.base_url
                );
            }
            Ok(())
        }
        SourcesAction::Add {
            id,
            name,
            url,
            zoom_min,
            zoom_max,
            tile_size_log,
        } => {
            if zoom_min > zoom_max {
                return Err(CliError::Source(format!(
                    "zoom range {}-{} is inverted",
                    zoom_min, zoom_max
                )));
            }
            let source = RendererSource {
                id,
                name,
                base_url: url,
                zoom_min,
                zoom_max,
                tile_size_log,
            };
            if !catalog.upsert(&source) {
                return Err(CliError::Source(format!(
                    "failed to save '{}' (see log)",
                    source.id
                )));
            }
            println!("Saved source '{}'", source.id);
            Ok(())
        }
        SourcesAction::Remove { id } => {
            if !catalog.remove(&id) {
                return Err(CliError::Source(format!("no source named '{}'", id)));
            }
            println!("Removed source '{}'", id);
            Ok(())
        }
    }
}
