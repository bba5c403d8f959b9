//! Expiry Module
//!
//! Staleness checks and the namespace sweep.

use crate::cache::{CacheEngine, ChangeAction, Entry};

/// True iff `entry` has an expiry and `now` is past it.
pub fn is_expired(entry: &Entry, now: u64) -> bool {
    entry.is_expired(now)
}

impl CacheEngine {
    // == Sweep ==
    /// Removes every expired or undecodable record under this namespace.
    ///
    /// Emits an `expire` event for each removed key that was mirrored and
    /// returns the removed logical keys.
    pub fn sweep(&mut self) -> Vec<String> {
        if !self.supported {
            return Vec::new();
        }

        let physical_keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(err) => {
                self.log_failure("Cleanup failed", "", &err);
                return Vec::new();
            }
        };

        let now = self.clock.now_ms();
        let stale: Vec<(String, String)> = physical_keys
            .into_iter()
            .filter(|(physical, _)| match self.store.get(physical) {
                Ok(Some(raw)) => match self.decode_raw(&raw, false) {
                    Ok(entry) => is_expired(&entry, now),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(_) => true,
            })
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for (physical, logical) in stale {
            if let Err(err) = self.store.remove(&physical) {
                self.log_failure("Cleanup remove failed", &logical, &err);
                continue;
            }
            if self.flags.enable_metrics {
                self.metrics.record_expiration();
            }
            if let Some(previous) = self.mirror.remove(&logical) {
                self.emit(&logical, Some(previous.value), None, ChangeAction::Expire);
            }
            self.log_event("Removed expired item", &logical);
            removed.push(logical);
        }
        removed
    }

    /// Sweeps on demand and returns how many records were removed.
    pub fn cleanup(&mut self) -> usize {
        let removed = self.sweep().len();
        if self.config.enable_logging {
            tracing::debug!(prefix = %self.config.prefix, removed, "Manual cleanup completed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{codec, EngineParts, GetOptions, ManualClock, PutOptions};
    use crate::config::{CacheConfig, CacheFlags};
    use crate::storage::{KeyValueStore, MemoryBackend};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn engine(backend: &MemoryBackend, clock: &ManualClock, flags: CacheFlags) -> CacheEngine {
        let parts = EngineParts::new(Arc::new(backend.clone())).with_clock(Arc::new(clock.clone()));
        CacheEngine::with_parts(CacheConfig::session("sw"), flags, parts).unwrap()
    }

    fn no_cleanup() -> CacheFlags {
        CacheFlags {
            auto_cleanup: false,
            ..CacheFlags::default()
        }
    }

    #[test]
    fn test_is_expired() {
        let entry = Entry::new(json!(1), START, 1, false);
        assert!(!is_expired(&entry, START + 60_000));
        assert!(is_expired(&entry, START + 60_001));
        assert!(!is_expired(&Entry::new(json!(1), START, 0, false), u64::MAX));
    }

    #[test]
    fn test_sweep_removes_expired_and_corrupt() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut engine = engine(&backend, &clock, no_cleanup());

        engine.put("short", &1, PutOptions::ttl(1)).unwrap();
        engine.put("long", &2, PutOptions::ttl(60)).unwrap();
        engine.put("forever", &3, PutOptions::default()).unwrap();
        backend.set_item("sw:corrupt", "garbage!").unwrap();
        backend.set_item("other:short", "garbage!").unwrap();

        clock.advance(Duration::from_secs(120));

        let mut removed = engine.sweep();
        removed.sort();
        assert_eq!(removed, vec!["corrupt", "short"]);
        assert_eq!(engine.keys(), vec!["forever", "long"]);
        // Other namespaces are never touched
        assert!(backend.get_item("other:short").unwrap().is_some());
    }

    #[test]
    fn test_sweep_emits_expire_for_mirrored_keys_only() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let mut engine = engine(&backend, &clock, no_cleanup());

        engine.put("mirrored", &"m", PutOptions::ttl(1)).unwrap();
        let unmirrored = Entry::new(json!("u"), START, 1, false);
        backend
            .set_item("sw:unmirrored", &codec::encode(&unmirrored).unwrap())
            .unwrap();

        let mut events = engine.watch_all();
        clock.advance(Duration::from_secs(61));
        assert_eq!(engine.cleanup(), 2);

        let events = events.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "mirrored");
        assert_eq!(events[0].action, ChangeAction::Expire);
        assert_eq!(events[0].old_value, Some(json!("m")));
    }

    #[test]
    fn test_sweep_over_large_foreign_keyspace() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        for i in 0..20_000 {
            backend.set_item(&format!("foreign:{}", i), "x").unwrap();
        }
        let mut engine = engine(&backend, &clock, no_cleanup());
        engine.put("mine", &1, PutOptions::ttl(1)).unwrap();

        clock.advance(Duration::from_secs(61));
        assert_eq!(engine.sweep(), vec!["mine"]);
        assert_eq!(backend.len().unwrap(), 20_000);
    }

    #[test]
    fn test_auto_cleanup_sweeps_on_construction() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let stale = Entry::new(json!("old"), START - 10 * 60_000, 1, false);
        backend
            .set_item("sw:stale", &codec::encode(&stale).unwrap())
            .unwrap();

        let mut engine = engine(&backend, &clock, CacheFlags::default());
        assert!(backend.get_item("sw:stale").unwrap().is_none());
        assert_eq!(engine.get("stale", GetOptions::default()), None);
    }

    #[test]
    fn test_no_sweep_without_auto_cleanup() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let stale = Entry::new(json!("old"), START - 10 * 60_000, 1, false);
        backend
            .set_item("sw:stale", &codec::encode(&stale).unwrap())
            .unwrap();

        let _engine = engine(&backend, &clock, no_cleanup());
        assert!(backend.get_item("sw:stale").unwrap().is_some());
    }
}
