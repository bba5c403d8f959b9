//! Periodic Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns a background task that sweeps the engine every `interval`.
///
/// The first sweep happens one interval after spawning; the engine already
/// sweeps once at construction when auto-cleanup is on. Each run holds the
/// write lock, so a sweep never interleaves with another engine operation.
///
/// Abort the returned handle to tear the timer down with the engine.
///
/// # Example
/// ```ignore
/// let engine = Arc::new(RwLock::new(CacheEngine::new(config, flags)?));
/// let sweep_handle = spawn_sweep_task(engine.clone(), Duration::from_secs(300));
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(engine: Arc<RwLock<CacheEngine>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting sweep task with interval of {} seconds",
            interval.as_secs_f64()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut guard = engine.write().await;
                guard.sweep().len()
            };

            if removed > 0 {
                info!("Sweep: removed {} expired entries", removed);
            } else {
                debug!("Sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EngineParts, GetOptions, ManualClock, PutOptions};
    use crate::config::{CacheConfig, CacheFlags};
    use crate::storage::{KeyValueStore, MemoryBackend};

    fn shared_engine(backend: &MemoryBackend, clock: &ManualClock) -> Arc<RwLock<CacheEngine>> {
        let parts = EngineParts::new(Arc::new(backend.clone())).with_clock(Arc::new(clock.clone()));
        let engine =
            CacheEngine::with_parts(CacheConfig::session("task"), CacheFlags::default(), parts)
                .unwrap();
        Arc::new(RwLock::new(engine))
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::starting_now();
        let engine = shared_engine(&backend, &clock);

        engine
            .write()
            .await
            .put("expire_soon", "value", PutOptions::ttl(1))
            .unwrap();

        let handle = spawn_sweep_task(engine.clone(), Duration::from_millis(50));
        clock.advance(Duration::from_secs(61));

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(
            backend.get_item("task:expire_soon").unwrap().is_none(),
            "Expired entry should have been swept"
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::starting_now();
        let engine = shared_engine(&backend, &clock);

        engine
            .write()
            .await
            .put("long_lived", "value", PutOptions::ttl(60))
            .unwrap();

        let handle = spawn_sweep_task(engine.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let value = engine
            .write()
            .await
            .get("long_lived", GetOptions::default());
        assert_eq!(value, Some(serde_json::json!("value")));

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::starting_now();
        let handle = spawn_sweep_task(shared_engine(&backend, &clock), Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
