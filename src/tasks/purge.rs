//! Purge Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheStore, PassReport};
use crate::error::{Result, StoreError};

/// Runs one purge pass on the blocking pool and logs its outcome.
///
/// Warns when the stored payload exceeds the configured maximum size.
pub async fn run_purge<K>(store: Arc<CacheStore<K>>) -> Result<PassReport>
where
    K: CacheKey + 'static,
{
    let report = tokio::task::spawn_blocking(move || {
        let report = store.purge_expired()?;
        let total = store.total_bytes()?;
        let max = store.config().max_size_bytes;
        if total > max {
            warn!(
                "Cache holds {} bytes, above the configured maximum of {} bytes",
                total, max
            );
        }
        Ok::<_, StoreError>(report)
    })
    .await
    .map_err(|e| StoreError::StoreUnavailable(format!("purge task failed: {e}")))??;

    // Log purge statistics
    if report.entries_removed > 0 {
        info!(
            "Purge: removed {} expired entries and {} buckets in {} commits",
            report.entries_removed, report.buckets_removed, report.commits
        );
    } else {
        debug!("Purge: no expired entries found");
    }
    Ok(report)
}

/// Spawns a background task that periodically purges expired entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between passes. A failed pass is logged and the loop carries on; batches
/// it committed before failing stay removed.
///
/// # Arguments
/// * `store` - Shared reference to the cache store
/// * `purge_interval_secs` - Interval in seconds between purge passes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::new(repository, config)?);
/// let purge_handle = spawn_purge_task(store.clone(), 60);
/// // Later, during shutdown:
/// purge_handle.abort();
/// ```
pub fn spawn_purge_task<K>(store: Arc<CacheStore<K>>, purge_interval_secs: u64) -> JoinHandle<()>
where
    K: CacheKey + 'static,
{
    let interval = Duration::from_secs(purge_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting purge task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            if let Err(e) = run_purge(store.clone()).await {
                error!("Purge pass failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheContent, RequestKey};
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::repository::MemoryRepository;

    fn store(clock: Arc<ManualClock>) -> Arc<CacheStore<RequestKey>> {
        let config = StoreConfig {
            ttl: Some(Duration::from_secs(1)),
            ..StoreConfig::default()
        };
        let store = CacheStore::new(Arc::new(MemoryRepository::new()), config)
            .unwrap()
            .with_clock(clock);
        store.ensure_root().unwrap();
        Arc::new(store)
    }

    fn content() -> CacheContent {
        CacheContent::new(200, "utf-8", "text/plain", Vec::<(String, String)>::new(), b"value".to_vec())
    }

    #[tokio::test]
    async fn test_run_purge_removes_expired_entries() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = store(clock.clone());
        let key = RequestKey::new("/expire_soon", "/expire_soon", ["g"]);
        store.put(&key, &content()).unwrap();

        clock.advance(chrono::Duration::seconds(2));
        let report = run_purge(store.clone()).await.unwrap();

        assert_eq!(report.entries_removed, 1);
        assert_eq!(store.size().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_task_preserves_valid_entries() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = store(clock);
        let key = RequestKey::new("/long_lived", "/long_lived", ["g"]);
        store.put(&key, &content()).unwrap();

        // Spawn purge task
        let handle = spawn_purge_task(store.clone(), 1);

        // Wait for a pass to run
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Verify entry still exists
        assert!(store.contains(&key).unwrap(), "Valid entry should not be removed");

        // Abort the purge task
        handle.abort();
    }

    #[tokio::test]
    async fn test_purge_task_can_be_aborted() {
        let clock = Arc::new(ManualClock::starting_now());
        let handle = spawn_purge_task(store(clock), 1);

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
