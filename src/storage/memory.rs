//! In-memory backend
//!
//! Session-scoped storage with a byte quota.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CacheError, Result};
use crate::storage::KeyValueStore;

// == Item Map ==
/// Ordered string map that enforces a byte quota over `key.len() + value.len()`.
#[derive(Debug, Default, Clone)]
pub(crate) struct ItemMap {
    items: BTreeMap<String, String>,
    used_bytes: usize,
    quota: Option<usize>,
}

impl ItemMap {
    pub(crate) fn new(quota: Option<usize>) -> Self {
        Self {
            items: BTreeMap::new(),
            used_bytes: 0,
            quota,
        }
    }

    pub(crate) fn from_items(items: BTreeMap<String, String>, quota: Option<usize>) -> Self {
        let used_bytes = items.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self {
            items,
            used_bytes,
            quota,
        }
    }

    pub(crate) fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn key(&self, index: usize) -> Option<String> {
        self.items.keys().nth(index).cloned()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    /// Inserts `value`, returning the previous value.
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        let previous = self.items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let requested = self.used_bytes - previous + key.len() + value.len();

        if let Some(quota) = self.quota {
            if requested > quota {
                return Err(CacheError::QuotaExceeded { requested, quota });
            }
        }

        self.used_bytes = requested;
        Ok(self.items.insert(key.to_string(), value.to_string()))
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.items.remove(key);
        if let Some(value) = &removed {
            self.used_bytes -= key.len() + value.len();
        }
        removed
    }

    /// Puts back whatever `previous` held for `key`, undoing a set or remove.
    pub(crate) fn restore(&mut self, key: &str, previous: Option<String>) {
        self.remove(key);
        if let Some(value) = previous {
            self.used_bytes += key.len() + value.len();
            self.items.insert(key.to_string(), value);
        }
    }

    pub(crate) fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

pub(crate) fn lock(map: &Mutex<ItemMap>) -> MutexGuard<'_, ItemMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// == Memory Backend ==
/// Session-scoped backend. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<ItemMap>>,
}

impl MemoryBackend {
    /// Unbounded backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ItemMap::new(Some(quota_bytes)))),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        lock(&self.inner).used_bytes()
    }
}

impl KeyValueStore for MemoryBackend {
    fn len(&self) -> Result<usize> {
        Ok(lock(&self.inner).len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(lock(&self.inner).key(index))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.inner).keys())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.inner).get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.inner).set(key, value).map(|_| ())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.inner).remove(key);
        Ok(())
    }
}
