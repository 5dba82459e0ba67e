// ABOUTME: Periodic background maintenance for the in-process cache.
// ABOUTME: Runs sweep_expired on a tokio interval; the cache mutex keeps runs serialized.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::data::DataLayer;

/// Spawn the periodic expired-entry sweep. The sweep itself is synchronous
/// and I/O-free, so a tick costs one short mutex hold; ticks can never
/// overlap because they run sequentially on this one task.
pub fn spawn_sweeper(data: Arc<DataLayer>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // real sweep happens one full interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = data.sweep_expired();
            if purged > 0 {
                tracing::info!("cache sweep purged {} expired entries", purged);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use plydata_cache::CacheConfig;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweeper_purges_expired_entries() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig {
            data_dir: dir.path().join("data"),
            static_dir: None,
            sweep_interval: Duration::from_millis(20),
        };
        let cache_config = CacheConfig {
            user_ttl: Duration::from_millis(10),
            ..CacheConfig::default()
        };
        let data = Arc::new(DataLayer::open_with_cache(&config, cache_config).unwrap());

        data.save_user_record(42, json!({ "points": 10 })).unwrap();
        data.user_record(42).unwrap();
        assert_eq!(data.cache_stats().users_cached, 1);

        let handle = spawn_sweeper(Arc::clone(&data), config.sweep_interval);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(data.cache_stats().users_cached, 0);
        handle.abort();
    }
}
