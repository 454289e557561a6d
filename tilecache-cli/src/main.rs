//! TileCache CLI - maintenance commands for a tile cache
//!
//! Inspects the usage index, runs eviction passes, manages the renderer
//! catalog and can keep a cache under budget in the foreground.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilecache::config::{config_file_path, ConfigFile};
use tilecache::logging::init_logging;

use commands::cache::EvictArgs;
use commands::config::ConfigAction;
use commands::sources::SourcesAction;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilecache")]
#[command(version = tilecache::VERSION)]
#[command(about = "Inspect and maintain a disk-backed map tile cache", long_about = None)]
struct Cli {
    /// Config file to read (default: ~/.tilecache/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Cache directory, overriding [cache] directory from the config file
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show tile counts and cache size per source
    Stats,
    /// Evict tiles oldest-first by size, or the least-used tiles
    Evict(EvictArgs),
    /// Evict down to the configured target if the cache is over budget
    Enforce,
    /// Remove every cached tile of one source
    Flush {
        /// Source identifier (e.g. "osm")
        source: String,
    },
    /// Drop index rows whose tile files no longer exist
    Prune,
    /// Manage registered tile sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Keep the cache under budget until interrupted
    Watch,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    if let Commands::Config { action } = cli.command {
        return commands::config::run(action, &config_path);
    }

    let mut config = ConfigFile::load_from(&config_path)?;
    if let Some(dir) = cli.cache_dir {
        config.cache.directory = dir;
    }

    let _logging = init_logging(
        &config.logging.directory,
        &config.logging.file,
        &config.logging.level,
    )
    .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let cache = commands::open_cache(&config)?;

    let result = match cli.command {
        Commands::Stats => commands::cache::stats(&cache, &config),
        Commands::Evict(args) => commands::cache::evict(&cache, &args),
        Commands::Enforce => commands::cache::enforce(&cache, &config),
        Commands::Flush { source } => commands::cache::flush(&cache, &source),
        Commands::Prune => commands::cache::prune(&cache),
        Commands::Sources { action } => commands::sources::run(&cache, action),
        Commands::Watch => commands::cache::watch(&cache, &config),
        Commands::Config { action } => commands::config::run(action, &config_path),
    };

    cache.close();
    result
}
