//! Cache Statistics Module
//!
//! Storage usage snapshots and optional hit/miss metrics.

use serde::Serialize;

// == Storage Stats ==
/// Snapshot of everything stored under one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStats {
    pub total_items: usize,
    /// Sum of stored (encoded, possibly encrypted) string sizes
    pub total_size_bytes: usize,
    /// Backend quota minus `total_size_bytes`
    pub available_space: usize,
    pub items: Vec<ItemStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStats {
    /// Logical key
    pub key: String,
    pub size_bytes: usize,
    /// 0 when the record could not be decoded
    pub created_at: u64,
    pub has_expiry: bool,
}

impl StorageStats {
    pub fn empty(quota_bytes: usize) -> Self {
        Self {
            available_space: quota_bytes,
            ..Self::default()
        }
    }

    pub fn push(&mut self, item: ItemStats) {
        self.total_items += 1;
        self.total_size_bytes += item.size_bytes;
        self.items.push(item);
    }

    /// Sorts items by key and recomputes the remaining space.
    pub fn finish(mut self, quota_bytes: usize) -> Self {
        self.items.sort_by(|a, b| a.key.cmp(&b.key));
        self.available_space = quota_bytes.saturating_sub(self.total_size_bytes);
        self
    }
}

// == Cache Metrics ==
/// Counters collected while the `enable_metrics` flag is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    /// Reads that returned a stored value
    pub hits: u64,
    /// Reads that fell back to the default
    pub misses: u64,
    /// Successful puts
    pub writes: u64,
    /// Explicit removals of existing keys
    pub removals: u64,
    /// Entries dropped because they expired or were corrupt
    pub expirations: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }
}
