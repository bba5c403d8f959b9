//! Cache Module
//!
//! Encrypted, TTL-aware key/value cache over a synchronous store.

mod cipher;
mod clock;
pub mod codec;
mod engine;
mod entry;
mod expiry;
mod namespace;
mod notifier;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use cipher::{decode_fallback, derive_key, encode_fallback, Cipher, PBKDF2_ITERATIONS, SALT_KEY};
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use engine::{CacheEngine, EngineParts, GetOptions, PutOptions, RemoveManyResult};
pub use entry::{expiry_from_ttl, Entry};
pub use expiry::is_expired;
pub use namespace::KeyNamespace;
pub use notifier::{
    compile_pattern, ChangeAction, ChangeEvent, ChangeNotifier, KeyChange, Subscription,
    SubscriptionId,
};
pub use stats::{CacheMetrics, ItemStats, StorageStats};
