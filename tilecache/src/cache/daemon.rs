//! Size-budget enforcement.
//!
//! [`BudgetEnforcer`] compares the index total against the configured maximum
//! and, when over, evicts oldest-first down to the target ratio.
//! [`run_budget_daemon`] calls it periodically until cancelled. Eviction does
//! blocking SQLite and filesystem work, so each pass runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::eviction::{EvictionEngine, EvictionResult};
use crate::cache::types::{CacheConfig, CacheError};

/// Default fraction of the maximum size to evict down to.
pub const DEFAULT_TARGET_RATIO: f64 = 0.9;

/// Keeps the cache under a byte budget.
#[derive(Debug)]
pub struct BudgetEnforcer {
    engine: Arc<EvictionEngine>,
    max_size_bytes: u64,
    target_ratio: f64,
}

impl BudgetEnforcer {
    /// Create an enforcer with the default 90% target.
    pub fn new(engine: Arc<EvictionEngine>, max_size_bytes: u64) -> Self {
        Self {
            engine,
            max_size_bytes,
            target_ratio: DEFAULT_TARGET_RATIO,
        }
    }

    /// Create an enforcer from cache configuration.
    pub fn from_config(engine: Arc<EvictionEngine>, config: &CacheConfig) -> Self {
        Self::new(engine, config.max_size_bytes)
            .with_target_ratio(config.target_percent as f64 / 100.0)
    }

    /// Set the fraction of `max_size_bytes` to evict down to (clamped to 0..=1).
    pub fn with_target_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Size the cache is reduced to once over budget.
    pub fn target_size_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * self.target_ratio) as u64
    }

    /// Returns true if the index total exceeds the budget.
    pub fn is_over_budget(&self) -> bool {
        self.engine.index().total_bytes() > self.max_size_bytes
    }

    /// Evict if over budget.
    ///
    /// Returns `None` when the cache is within budget, otherwise the result
    /// of an oldest-first eviction of `total - target` bytes.
    pub fn enforce(&self) -> Option<Result<EvictionResult, CacheError>> {
        let total = self.engine.index().total_bytes();
        if total <= self.max_size_bytes {
            debug!(
                current_mb = total / 1_000_000,
                max_mb = self.max_size_bytes / 1_000_000,
                "Cache within budget"
            );
            return None;
        }

        let to_free = total - self.target_size_bytes();
        info!(
            current_mb = total / 1_000_000,
            max_mb = self.max_size_bytes / 1_000_000,
            target_mb = self.target_size_bytes() / 1_000_000,
            to_free_mb = to_free / 1_000_000,
            "Cache over budget, evicting oldest tiles"
        );

        Some(self.engine.delete_oldest(to_free))
    }
}

/// Run [`BudgetEnforcer::enforce`] every `interval` until `shutdown` fires.
///
/// # Example
///
/// ```ignore
/// let shutdown = CancellationToken::new();
/// tokio::spawn(run_budget_daemon(enforcer, Duration::from_secs(60), shutdown.clone()));
/// // ...
/// shutdown.cancel();
/// ```
pub async fn run_budget_daemon(
    enforcer: Arc<BudgetEnforcer>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        check_interval_secs = interval.as_secs(),
        max_mb = enforcer.max_size_bytes() / 1_000_000,
        target_mb = enforcer.target_size_bytes() / 1_000_000,
        "Budget daemon starting"
    );

    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Budget daemon shutting down");
                break;
            }

            _ = ticker.tick() => {
                let enforcer = Arc::clone(&enforcer);
                match tokio::task::spawn_blocking(move || enforcer.enforce()).await {
                    Ok(None) | Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) if e.is_empty_cache() => {
                        warn!(error = %e, "Over budget but nothing left to evict");
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "Budget eviction failed");
                    }
                    Err(e) => {
                        warn!(error = %e, "Budget eviction task panicked");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::database::CacheDatabase;
    use crate::cache::fs::LocalFileStore;
    use crate::cache::index::CacheIndex;
    use crate::cache::path::HierarchicalPathResolver;
    use crate::cache::types::TileKey;

    fn create_engine() -> (Arc<EvictionEngine>, Arc<ManualClock>) {
        let db = Arc::new(CacheDatabase::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::default());
        let index = Arc::new(CacheIndex::with_clock(db, clock.clone()));
        // Paths never exist; deletes report Missing
        let resolver = Arc::new(HierarchicalPathResolver::new("/nonexistent/tilecache"));
        let engine = EvictionEngine::new(index, resolver, Arc::new(LocalFileStore));
        (Arc::new(engine), clock)
    }

    fn fill(engine: &EvictionEngine, clock: &ManualClock, count: u32, size: u64) {
        for i in 0..count {
            clock.advance(chrono::Duration::seconds(1));
            engine
                .index()
                .insert_or_skip(&TileKey::new("osm", 10, i, 0), size);
        }
    }

    #[test]
    fn test_target_size() {
        let (engine, _) = create_engine();
        let enforcer = BudgetEnforcer::new(engine, 10_000);
        assert_eq!(enforcer.target_size_bytes(), 9_000);

        let enforcer = BudgetEnforcer::new(enforcer.engine.clone(), 10_000).with_target_ratio(1.5);
        assert_eq!(enforcer.target_size_bytes(), 10_000);
    }

    #[test]
    fn test_from_config() {
        let (engine, _) = create_engine();
        let config = CacheConfig::default()
            .with_max_size(1_000_000)
            .with_target_percent(75);

        let enforcer = BudgetEnforcer::from_config(engine, &config);
        assert_eq!(enforcer.max_size_bytes(), 1_000_000);
        assert_eq!(enforcer.target_size_bytes(), 750_000);
    }

    #[test]
    fn test_enforce_within_budget_is_noop() {
        let (engine, clock) = create_engine();
        fill(&engine, &clock, 5, 1000);

        let enforcer = BudgetEnforcer::new(engine.clone(), 5000);
        assert!(!enforcer.is_over_budget());
        assert!(enforcer.enforce().is_none());
        assert_eq!(engine.index().total_bytes(), 5000);
    }

    #[test]
    fn test_enforce_evicts_to_target() {
        let (engine, clock) = create_engine();
        fill(&engine, &clock, 12, 1000);

        let enforcer = BudgetEnforcer::new(engine.clone(), 10_000);
        assert!(enforcer.is_over_budget());

        let result = enforcer.enforce().unwrap().unwrap();

        // 12000 - 9000 = 3000 bytes, three oldest tiles
        assert_eq!(result.rows_removed, 3);
        assert_eq!(engine.index().total_bytes(), 9_000);
        assert!(!engine.index().exists(&TileKey::new("osm", 10, 0, 0)));
        assert!(engine.index().exists(&TileKey::new("osm", 10, 3, 0)));
    }

    #[tokio::test]
    async fn test_daemon_respects_shutdown() {
        let (engine, _) = create_engine();
        let enforcer = Arc::new(BudgetEnforcer::new(engine, 10_000));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_budget_daemon(
            enforcer,
            Duration::from_millis(100),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_daemon_evicts_when_over_budget() {
        let (engine, clock) = create_engine();
        fill(&engine, &clock, 20, 1000);
        let enforcer = Arc::new(BudgetEnforcer::new(engine.clone(), 10_000));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_budget_daemon(
            enforcer,
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        let mut within_budget = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.index().total_bytes() <= 10_000 {
                within_budget = true;
                break;
            }
        }
        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(within_budget);
        assert_eq!(engine.index().total_bytes(), 9_000);
    }
}
