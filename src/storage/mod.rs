//! Storage Module
//!
//! Synchronous key/value backends and the adapter the cache engine talks to.
//!
//! # Backends
//! - `FileBackend`: persistent, JSON file written through on every change
//! - `MemoryBackend`: session-scoped, lives as long as the process
//! - `UnavailableBackend`: stand-in when the configured backend cannot be opened

mod adapter;
mod file;
mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::{CacheConfig, StorageType};
use crate::error::{CacheError, Result};

pub use adapter::StoreAdapter;
pub use file::FileBackend;
pub use memory::MemoryBackend;

// == Key Value Store ==
/// Capability shared by every backend: an indexed string map with
/// `len`, `key(i)`, `get_item`, `set_item` and `remove_item`.
///
/// Implementations use interior mutability so one backend can be shared by
/// several engines (each under its own prefix).
pub trait KeyValueStore: Send + Sync + Debug {
    /// Number of stored items.
    fn len(&self) -> Result<usize>;

    /// Key at `index` in the backend's enumeration order, if any.
    fn key(&self, index: usize) -> Result<Option<String>>;

    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Fails with `CacheError::QuotaExceeded` when the write would exceed capacity.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of every key. The default walks `key(i)`; map-backed stores
    /// override it with a single pass.
    fn keys(&self) -> Result<Vec<String>> {
        let len = self.len()?;
        let mut keys = Vec::with_capacity(len);
        for index in 0..len {
            if let Some(key) = self.key(index)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

// == Unavailable Backend ==
/// Backend used when no real store exists; every call fails.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn err<T>(&self) -> Result<T> {
        Err(CacheError::Unavailable(self.reason.clone()))
    }
}

impl KeyValueStore for UnavailableBackend {
    fn len(&self) -> Result<usize> {
        self.err()
    }

    fn key(&self, _index: usize) -> Result<Option<String>> {
        self.err()
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.err()
    }

    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        self.err()
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        self.err()
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        self.err()
    }
}

// == Open Backend ==
/// Opens the backend selected by `config.storage_type`.
pub fn open_backend(config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.storage_type {
        StorageType::Persistent => {
            let backend = FileBackend::open(&config.storage_path, config.quota_bytes)?;
            Ok(Arc::new(backend))
        }
        StorageType::Session => Ok(Arc::new(MemoryBackend::with_quota(config.quota_bytes))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_backend_fails_everything() {
        let backend = UnavailableBackend::new("no storage here");

        assert!(matches!(backend.len(), Err(CacheError::Unavailable(_))));
        assert!(matches!(backend.get_item("a"), Err(CacheError::Unavailable(_))));
        assert!(matches!(
            backend.set_item("a", "b"),
            Err(CacheError::Unavailable(_))
        ));
        assert!(matches!(backend.remove_item("a"), Err(CacheError::Unavailable(_))));
    }

    /// Store that only knows indexed access, to exercise the default `keys`.
    #[derive(Debug)]
    struct IndexedOnly(Vec<(String, String)>);

    impl KeyValueStore for IndexedOnly {
        fn len(&self) -> Result<usize> {
            Ok(self.0.len())
        }

        fn key(&self, index: usize) -> Result<Option<String>> {
            Ok(self.0.get(index).map(|(k, _)| k.clone()))
        }

        fn get_item(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn remove_item(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_keys_walks_indices() {
        let store = IndexedOnly(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(store.keys().unwrap(), vec!["b", "a"]);
        assert!(matches!(
            UnavailableBackend::new("none").keys(),
            Err(CacheError::Unavailable(_))
        ));
    }

    #[test]
    fn test_open_session_backend() {
        let backend = open_backend(&CacheConfig::session("app")).unwrap();
        backend.set_item("k", "v").unwrap();
        assert_eq!(backend.get_item("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_open_persistent_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::persistent("app", dir.path().join("store.json"));

        let backend = open_backend(&config).unwrap();
        backend.set_item("k", "v").unwrap();
        assert!(dir.path().join("store.json").exists());
    }
}
