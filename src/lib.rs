//! Vault Cache - An encrypted, TTL-aware key/value cache
//!
//! Layers namespacing, expiry, optional authenticated encryption and change
//! notifications over a synchronous key/value store, and exposes the engine
//! over a small HTTP service.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEngine, EngineParts, GetOptions, PutOptions};
pub use config::{CacheConfig, CacheFlags, NamedConfigs, ServerConfig, StorageType};
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
