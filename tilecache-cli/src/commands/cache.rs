//! Index inspection and eviction commands.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tilecache::cache::{run_budget_daemon, BudgetEnforcer, EvictionResult, TileCache};
use tilecache::config::{format_size_approx, parse_size, ConfigFile};

use crate::error::CliError;

/// Arguments for `tilecache evict`.
#[derive(Debug, Args)]
pub struct EvictArgs {
    /// Free at least this much space, oldest tiles first (e.g. 500MB, 2GB)
    #[arg(long, conflicts_with = "least_used", required_unless_present = "least_used")]
    pub bytes: Option<String>,

    /// Evict every tile at the lowest usage count instead
    #[arg(long)]
    pub least_used: bool,
}

/// Print index statistics.
pub fn stats(cache: &TileCache, config: &ConfigFile) -> Result<(), CliError> {
    let stats = cache.index().stats();
    let max_size = config.cache.max_size;

    println!("Tile cache: {}", config.cache.directory.display());
    println!("  Index:    {}", cache.database().location());
    println!("  Tiles:    {}", stats.valid_entries());
    println!("  Invalid:  {}", stats.invalid_entries);
    println!(
        "  Size:     {} of {} ({:.1}%)",
        format_size_approx(stats.total_bytes),
        format_size_approx(max_size),
        stats.utilization(max_size) * 100.0
    );

    if !stats.sources.is_empty() {
        println!();
        println!("  {:<20} {:>10} {:>10} {:>12}", "SOURCE", "TILES", "INVALID", "SIZE");
        for source in &stats.sources {
            println!(
                "  {:<20} {:>10} {:>10} {:>12}",
                source.source,
                source.entries - source.invalid_entries,
                source.invalid_entries,
                format_size_approx(source.total_bytes)
            );
        }
    }
    Ok(())
}

/// Evict oldest-first down by a byte amount, or the least-used tie set.
pub fn evict(cache: &TileCache, args: &EvictArgs) -> Result<(), CliError> {
    let outcome = match (&args.bytes, args.least_used) {
        (_, true) => cache.engine().delete_least_used(),
        (Some(raw), false) => {
            let target = parse_size(raw).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            cache.engine().delete_oldest(target)
        }
        (None, false) => {
            return Err(CliError::InvalidArgument(
                "either --bytes or --least-used is required".to_string(),
            ))
        }
    };
    let result = outcome.map_err(CliError::Eviction)?;

    print_result("Evicted", &result);
    Ok(())
}

/// Run a single budget-enforcement pass.
pub fn enforce(cache: &TileCache, config: &ConfigFile) -> Result<(), CliError> {
    let enforcer = BudgetEnforcer::from_config(Arc::clone(cache.engine()), &config.cache_config());

    match enforcer.enforce() {
        None => {
            println!(
                "Cache within budget: {} of {}",
                format_size_approx(cache.index().total_bytes()),
                format_size_approx(enforcer.max_size_bytes())
            );
            Ok(())
        }
        Some(result) => {
            let result = result.map_err(CliError::Eviction)?;
            print_result("Enforced budget, evicted", &result);
            Ok(())
        }
    }
}

/// Remove every tile of one source.
pub fn flush(cache: &TileCache, source: &str) -> Result<(), CliError> {
    let result = cache
        .engine()
        .flush_source(source)
        .map_err(CliError::Eviction)?;
    print_result(&format!("Flushed '{}',", source), &result);
    Ok(())
}

/// Drop index rows whose tile file is gone.
pub fn prune(cache: &TileCache) -> Result<(), CliError> {
    let result = cache.engine().prune_dangling();
    if result.rows_removed == 0 {
        println!("No dangling index rows found");
    } else {
        println!(
            "Removed {} dangling rows ({} no longer counted)",
            result.rows_removed,
            format_size_approx(result.bytes_freed)
        );
    }
    Ok(())
}

/// Keep the cache under budget until Ctrl-C.
pub fn watch(cache: &TileCache, config: &ConfigFile) -> Result<(), CliError> {
    let cache_config = config.cache_config();
    let enforcer = Arc::new(BudgetEnforcer::from_config(
        Arc::clone(cache.engine()),
        &cache_config,
    ));
    let interval = Duration::from_secs(cache_config.gc_interval_secs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    println!(
        "Watching {} (limit {}, every {}s). Press Ctrl-C to stop.",
        config.cache.directory.display(),
        format_size_approx(enforcer.max_size_bytes()),
        interval.as_secs()
    );

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let daemon = tokio::spawn(run_budget_daemon(enforcer, interval, shutdown.clone()));

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
        }
        info!("Shutdown requested");
        shutdown.cancel();
        let _ = daemon.await;
    });

    Ok(())
}

fn print_result(action: &str, result: &EvictionResult) {
    println!(
        "{} {} tiles, freed {}",
        action,
        result.rows_removed,
        format_size_approx(result.bytes_freed)
    );
    if result.file_delete_failures > 0 || result.row_delete_failures > 0 {
        println!(
            "  {} file deletions and {} index updates failed (see log)",
            result.file_delete_failures, result.row_delete_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tilecache::cache::TileKey;

    fn create_cache() -> (TempDir, ConfigFile, TileCache) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ConfigFile::default();
        config.cache.directory = temp_dir.path().to_path_buf();
        config.cache.max_size = 1000;
        let cache = crate::commands::open_cache(&config).unwrap();
        (temp_dir, config, cache)
    }

    #[test]
    fn test_evict_bytes() {
        let (_temp_dir, _config, cache) = create_cache();
        cache.store(&TileKey::new("osm", 1, 0, 0), &[0u8; 400]).unwrap();

        let args = EvictArgs {
            bytes: Some("100".to_string()),
            least_used: false,
        };
        evict(&cache, &args).unwrap();

        assert_eq!(cache.index().total_bytes(), 0);
    }

    #[test]
    fn test_evict_rejects_bad_size() {
        let (_temp_dir, _config, cache) = create_cache();
        let args = EvictArgs {
            bytes: Some("lots".to_string()),
            least_used: false,
        };

        assert!(matches!(
            evict(&cache, &args),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_evict_empty_cache_is_an_error() {
        let (_temp_dir, _config, cache) = create_cache();
        let args = EvictArgs {
            bytes: None,
            least_used: true,
        };

        match evict(&cache, &args) {
            Err(CliError::Eviction(e)) => assert!(e.is_empty_cache()),
            other => panic!("expected EmptyCache, got {:?}", other),
        }
    }

    #[test]
    fn test_enforce_trims_over_budget_cache() {
        let (_temp_dir, config, cache) = create_cache();
        for x in 0..6 {
            cache.store(&TileKey::new("osm", 2, x, 0), &[0u8; 200]).unwrap();
        }

        enforce(&cache, &config).unwrap();

        // 1200 bytes against a 1000 limit, 90% target
        assert!(cache.index().total_bytes() <= 900);
    }

    #[test]
    fn test_flush_and_prune() {
        let (_temp_dir, _config, cache) = create_cache();
        cache.store(&TileKey::new("osm", 3, 0, 0), b"abc").unwrap();
        cache.store(&TileKey::new("bing", 3, 0, 0), b"abc").unwrap();

        flush(&cache, "osm").unwrap();
        prune(&cache).unwrap();

        assert_eq!(cache.index().len(), 1);
        assert!(matches!(
            flush(&cache, "osm"),
            Err(CliError::Eviction(_))
        ));
    }
}
