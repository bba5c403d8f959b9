//! Store Adapter
//!
//! The engine's view of a backend: get/set/remove/enumerate plus a probe.

use std::sync::Arc;

use crate::config::StorageType;
use crate::error::Result;
use crate::storage::KeyValueStore;

const PROBE_KEY: &str = "__vault_cache_probe__";

// == Store Adapter ==
/// Wraps one backend; the backend and its type are fixed for the adapter's lifetime.
#[derive(Debug, Clone)]
pub struct StoreAdapter {
    backend: Arc<dyn KeyValueStore>,
    storage_type: StorageType,
}

impl StoreAdapter {
    pub fn new(backend: Arc<dyn KeyValueStore>, storage_type: StorageType) -> Self {
        Self {
            backend,
            storage_type,
        }
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    pub fn get(&self, physical_key: &str) -> Result<Option<String>> {
        self.backend.get_item(physical_key)
    }

    pub fn set(&self, physical_key: &str, value: &str) -> Result<()> {
        self.backend.set_item(physical_key, value)
    }

    pub fn remove(&self, physical_key: &str) -> Result<()> {
        self.backend.remove_item(physical_key)
    }

    /// Snapshot of every key currently in the backend, in no particular order.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.backend.keys()
    }

    /// True if a write followed by a remove succeeds.
    pub fn probe(&self) -> bool {
        self.backend.set_item(PROBE_KEY, "probe").is_ok() && self.backend.remove_item(PROBE_KEY).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, UnavailableBackend};

    #[test]
    fn test_adapter_roundtrip() {
        let adapter = StoreAdapter::new(Arc::new(MemoryBackend::new()), StorageType::Session);

        adapter.set("p:a", "1").unwrap();
        assert_eq!(adapter.get("p:a").unwrap(), Some("1".to_string()));
        adapter.remove("p:a").unwrap();
        assert_eq!(adapter.get("p:a").unwrap(), None);
    }

    #[test]
    fn test_adapter_keys_snapshot() {
        let adapter = StoreAdapter::new(Arc::new(MemoryBackend::new()), StorageType::Session);
        adapter.set("a", "1").unwrap();
        adapter.set("b", "2").unwrap();

        let mut keys = adapter.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_probe_leaves_no_trace() {
        let backend = MemoryBackend::new();
        let adapter = StoreAdapter::new(Arc::new(backend.clone()), StorageType::Session);

        assert!(adapter.probe());
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn test_probe_fails_on_unavailable_backend() {
        let adapter = StoreAdapter::new(
            Arc::new(UnavailableBackend::new("none")),
            StorageType::Persistent,
        );
        assert!(!adapter.probe());
    }

    #[test]
    fn test_probe_fails_when_quota_is_zero() {
        let adapter = StoreAdapter::new(Arc::new(MemoryBackend::with_quota(0)), StorageType::Session);
        assert!(!adapter.probe());
    }
}
