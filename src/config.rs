//! Configuration Module
//!
//! Handles loading cache configuration and feature flags from environment
//! variables, plus the named-instance registry.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend capacity used when none is configured (5 MiB).
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Default interval between periodic sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

const DEFAULT_PASSWORD: &str = "vault-cache-default-key";

// == Storage Type ==
/// Which backing store an engine is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Survives process restarts (file-backed)
    Persistent,
    /// Lives as long as the process
    Session,
}

impl StorageType {
    pub fn name(&self) -> &'static str {
        match self {
            StorageType::Persistent => "persistent storage",
            StorageType::Session => "session storage",
        }
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persistent" | "local" | "localstorage" => Ok(StorageType::Persistent),
            "session" | "sessionstorage" => Ok(StorageType::Session),
            other => Err(format!("Unsupported storage type: {}", other)),
        }
    }
}

// == Cache Config ==
/// Process-wide engine configuration, immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Namespace prefix for physical keys
    pub prefix: String,
    /// Default TTL in minutes, 0 = never expires
    pub default_ttl: u64,
    /// Keep logical keys as given instead of lowercasing them
    pub case_sensitive: bool,
    /// Emit engine diagnostics through tracing
    pub enable_logging: bool,
    /// Backend selection
    pub storage_type: StorageType,
    /// File used by the persistent backend
    pub storage_path: PathBuf,
    /// Backend capacity in bytes
    pub quota_bytes: usize,
    /// Password fed to key derivation
    pub encryption_password: String,
    /// Seconds between periodic sweeps
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PREFIX` - Key prefix (default: vault-cache)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in minutes (default: 0)
    /// - `CACHE_CASE_SENSITIVE` - (default: false)
    /// - `CACHE_ENABLE_LOGGING` - (default: false)
    /// - `CACHE_STORAGE_TYPE` - `persistent` or `session` (default: session)
    /// - `CACHE_STORAGE_PATH` - Persistent backend file (default: vault-cache.json)
    /// - `CACHE_QUOTA_BYTES` - Backend capacity (default: 5 MiB)
    /// - `CACHE_ENCRYPTION_PASSWORD` - Key derivation password
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.prefix),
            default_ttl: parse_env("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            case_sensitive: parse_env("CACHE_CASE_SENSITIVE").unwrap_or(defaults.case_sensitive),
            enable_logging: parse_env("CACHE_ENABLE_LOGGING").unwrap_or(defaults.enable_logging),
            storage_type: parse_env("CACHE_STORAGE_TYPE").unwrap_or(defaults.storage_type),
            storage_path: env::var("CACHE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            quota_bytes: parse_env("CACHE_QUOTA_BYTES").unwrap_or(defaults.quota_bytes),
            encryption_password: env::var("CACHE_ENCRYPTION_PASSWORD")
                .unwrap_or(defaults.encryption_password),
            sweep_interval_secs: parse_env("CACHE_SWEEP_INTERVAL")
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }

    /// Session-scoped config with the given prefix and defaults elsewhere.
    pub fn session(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            storage_type: StorageType::Session,
            ..Self::default()
        }
    }

    /// Persistent config writing to `path`.
    pub fn persistent(prefix: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            storage_type: StorageType::Persistent,
            storage_path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "vault-cache".to_string(),
            default_ttl: 0,
            case_sensitive: false,
            enable_logging: false,
            storage_type: StorageType::Session,
            storage_path: PathBuf::from("vault-cache.json"),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            encryption_password: DEFAULT_PASSWORD.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

// == Cache Flags ==
/// Behavioural toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFlags {
    /// Sweep on construction and periodically afterwards
    pub auto_cleanup: bool,
    /// Fail construction when the backend is unusable
    pub strict_mode: bool,
    /// Track hit/miss counters
    pub enable_metrics: bool,
}

impl CacheFlags {
    /// Loads `CACHE_AUTO_CLEANUP`, `CACHE_STRICT_MODE` and `CACHE_ENABLE_METRICS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_cleanup: parse_env("CACHE_AUTO_CLEANUP").unwrap_or(defaults.auto_cleanup),
            strict_mode: parse_env("CACHE_STRICT_MODE").unwrap_or(defaults.strict_mode),
            enable_metrics: parse_env("CACHE_ENABLE_METRICS").unwrap_or(defaults.enable_metrics),
        }
    }
}

impl Default for CacheFlags {
    fn default() -> Self {
        Self {
            auto_cleanup: true,
            strict_mode: false,
            enable_metrics: false,
        }
    }
}

// == Named Configs ==
/// Mapping from instance name to configuration, built once at startup and
/// handed to each engine that needs it.
#[derive(Debug, Clone, Default)]
pub struct NamedConfigs {
    configs: HashMap<String, CacheConfig>,
}

impl NamedConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a named configuration.
    pub fn with(mut self, name: impl Into<String>, config: CacheConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CacheConfig> {
        self.configs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Server-side settings for the HTTP host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
}

impl ServerConfig {
    /// Reads `SERVER_PORT` (default: 3000).
    pub fn from_env() -> Self {
        Self {
            server_port: parse_env("SERVER_PORT").unwrap_or(3000),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
