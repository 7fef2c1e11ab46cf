//! Scheduled cleanup of revocation state.

use crate::cache::MemoryCache;
use crate::db::Database;
use crate::jwt::unix_now_ms;
use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Shared state the cleanup task maintains.
#[derive(Clone)]
pub struct CleanupTargets {
    pub db: Database,
    pub revocation_cache: Arc<MemoryCache<Option<u64>>>,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
    /// Longest lifetime of any token that can still be presented.
    pub token_ttl: u64,
}

/// Run all cleanup tasks once.
pub async fn run_cleanup(targets: &CleanupTargets) {
    // A record older than the longest token lifetime cannot reject anything.
    match unix_now_ms() {
        Ok(now) => {
            let cutoff = now.saturating_sub(targets.token_ttl.saturating_mul(1000));
            match targets.db.revocations().delete_older_than(cutoff).await {
                Ok(count) if count > 0 => info!("Cleaned up {} stale revocation records", count),
                Ok(_) => {}
                Err(e) => error!("Failed to clean up revocation records: {}", e),
            }
        }
        Err(e) => error!("Skipping revocation cleanup: {}", e),
    }

    let purged = targets.revocation_cache.purge_expired();
    if purged > 0 {
        info!("Purged {} expired revocation cache entries", purged);
    }

    if let Some(rate_limit) = &targets.rate_limit {
        rate_limit.retain_recent();
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(targets: CleanupTargets) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup cleanup already ran.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&targets).await;
        }
    })
}
