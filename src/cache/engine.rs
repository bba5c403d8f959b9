//! Cache Engine Module
//!
//! Orchestrates namespacing, the codec/cipher pipeline, the store adapter,
//! the in-memory mirror and change notification.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{
    codec, ChangeAction, ChangeEvent, ChangeNotifier, Cipher, Clock, Entry, KeyChange,
    KeyNamespace, StorageStats, Subscription, SubscriptionId, SystemClock,
};
use crate::cache::{CacheMetrics, ItemStats};
use crate::config::{CacheConfig, CacheFlags, NamedConfigs, StorageType};
use crate::error::{CacheError, Result};
use crate::storage::{open_backend, KeyValueStore, StoreAdapter, UnavailableBackend};

// == Options ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Encrypt the serialized entry before storing it
    pub encrypt: bool,
    /// Overrides the configured default TTL; `Some(0)` means never expires
    pub ttl_minutes: Option<u64>,
}

impl PutOptions {
    pub fn encrypted() -> Self {
        Self {
            encrypt: true,
            ttl_minutes: None,
        }
    }

    pub fn ttl(minutes: u64) -> Self {
        Self {
            encrypt: false,
            ttl_minutes: Some(minutes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    /// Try decryption before plain parsing
    pub decrypt: bool,
    /// Returned instead of None on a miss
    pub default_value: Option<Value>,
}

impl GetOptions {
    pub fn decrypted() -> Self {
        Self {
            decrypt: true,
            default_value: None,
        }
    }

    pub fn or(default_value: Value) -> Self {
        Self {
            decrypt: false,
            default_value: Some(default_value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveManyResult {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

/// Collaborators injected into an engine.
#[derive(Debug)]
pub struct EngineParts {
    pub backend: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    /// Defaults to an authenticated cipher keeping its salt in `backend`
    pub cipher: Option<Cipher>,
}

impl EngineParts {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            cipher: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cipher(mut self, cipher: Cipher) -> Self {
        self.cipher = Some(cipher);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MirrorEntry {
    pub(crate) value: Value,
    pub(crate) expires_at: Option<u64>,
}

impl MirrorEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.map_or(false, |expires| now > expires)
    }
}

// == Cache Engine ==
#[derive(Debug)]
pub struct CacheEngine {
    pub(crate) config: CacheConfig,
    pub(crate) flags: CacheFlags,
    pub(crate) namespace: KeyNamespace,
    pub(crate) store: StoreAdapter,
    pub(crate) cipher: Cipher,
    pub(crate) clock: Arc<dyn Clock>,
    /// Logical key -> last known decoded value
    pub(crate) mirror: HashMap<String, MirrorEntry>,
    pub(crate) notifier: ChangeNotifier,
    pub(crate) metrics: CacheMetrics,
    pub(crate) supported: bool,
    unsupported_message: String,
}

impl CacheEngine {
    // == Constructors ==
    /// Opens the backend selected by `config` and builds an engine over it.
    ///
    /// A backend that cannot be opened is fatal only in strict mode; otherwise
    /// the engine degrades and every operation returns its safe default.
    pub fn new(config: CacheConfig, flags: CacheFlags) -> Result<Self> {
        let backend: Arc<dyn KeyValueStore> = match open_backend(&config) {
            Ok(backend) => backend,
            Err(e) if flags.strict_mode => return Err(e),
            Err(e) => {
                if config.enable_logging {
                    warn!(prefix = %config.prefix, error = %e, "backend unavailable, degrading");
                }
                Arc::new(UnavailableBackend::new(e.to_string()))
            }
        };
        Self::with_parts(config, flags, EngineParts::new(backend))
    }

    /// Builds an engine from the named configuration in `named`.
    pub fn from_named(named: &NamedConfigs, name: &str, flags: CacheFlags) -> Result<Self> {
        let config = named
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::Internal(format!("no configuration named '{}'", name)))?;
        Self::new(config, flags)
    }

    /// Builds an engine over an existing backend with the system clock.
    pub fn with_backend(
        config: CacheConfig,
        flags: CacheFlags,
        backend: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        Self::with_parts(config, flags, EngineParts::new(backend))
    }

    pub fn with_parts(config: CacheConfig, flags: CacheFlags, parts: EngineParts) -> Result<Self> {
        let store = StoreAdapter::new(parts.backend.clone(), config.storage_type);
        let cipher = parts.cipher.unwrap_or_else(|| {
            Cipher::new(config.encryption_password.clone(), Some(parts.backend.clone()))
        });
        let supported = store.probe();
        let unsupported_message = format!(
            "{} is not available in this environment",
            config.storage_type.name()
        );

        let mut engine = Self {
            namespace: KeyNamespace::new(&config.prefix, config.case_sensitive),
            config,
            flags,
            store,
            cipher,
            clock: parts.clock,
            mirror: HashMap::new(),
            notifier: ChangeNotifier::new(),
            metrics: CacheMetrics::new(),
            supported,
            unsupported_message,
        };

        if !engine.supported {
            let err = CacheError::Unsupported(engine.unsupported_message.clone());
            engine.log_failure("Backend probe failed", "", &err);
            if engine.flags.strict_mode {
                return Err(err);
            }
        }

        if engine.flags.auto_cleanup {
            engine.sweep();
        }

        Ok(engine)
    }

    // == Put ==
    /// Stores `value` under `key`.
    ///
    /// Returns `Ok(false)` when the write degraded (backend unusable in
    /// non-strict mode). Invalid keys, quota errors and strict-mode
    /// unsupported backends are returned as errors.
    pub fn put<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: PutOptions,
    ) -> Result<bool> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::MalformedEntry(format!("value is not serializable: {}", e)))?;
        self.put_value(key, value, options)
    }

    pub fn put_value(&mut self, key: &str, value: Value, options: PutOptions) -> Result<bool> {
        if !self.supported {
            let err = CacheError::Unsupported(self.unsupported_message.clone());
            self.log_failure("Set data failed", key, &err);
            return if self.flags.strict_mode { Err(err) } else { Ok(false) };
        }

        let logical = self.namespace.normalize(key)?;
        let physical = self.namespace.to_physical(&logical)?;

        let now = self.clock.now_ms();
        let ttl = options.ttl_minutes.unwrap_or(self.config.default_ttl);
        let entry = Entry::new(value, now, ttl, options.encrypt);

        let mut serialized = codec::encode(&entry)?;
        if options.encrypt {
            serialized = self.cipher.encrypt(&serialized);
        }

        if let Err(err) = self.store.set(&physical, &serialized) {
            self.log_failure("Set data failed", &logical, &err);
            return if err.is_caller_actionable() { Err(err) } else { Ok(false) };
        }

        let previous = self.mirror.insert(
            logical.clone(),
            MirrorEntry {
                value: entry.value.clone(),
                expires_at: entry.expires_at,
            },
        );
        if self.flags.enable_metrics {
            self.metrics.record_write();
        }
        self.emit(
            &logical,
            previous.map(|m| m.value),
            Some(entry.value),
            ChangeAction::Set,
        );
        self.log_event("Data stored", &logical);
        Ok(true)
    }

    // == Get ==
    /// Returns the live value for `key`, or `options.default_value` on a miss.
    ///
    /// Expired and corrupt records are treated as misses and deleted.
    pub fn get(&mut self, key: &str, options: GetOptions) -> Option<Value> {
        let logical = match self.namespace.normalize(key) {
            Ok(logical) => logical,
            Err(err) => {
                self.log_failure("Get data failed", key, &err);
                return options.default_value;
            }
        };

        let now = self.clock.now_ms();
        if let Some(mirrored) = self.mirror.get(&logical) {
            if !mirrored.is_expired(now) {
                let value = mirrored.value.clone();
                self.record_read(true);
                return Some(value);
            }
            self.expire_key(&logical);
            self.record_read(false);
            return options.default_value;
        }

        match self.read_entry(&logical, options.decrypt) {
            Ok(Some(entry)) => {
                self.mirror.insert(
                    logical,
                    MirrorEntry {
                        value: entry.value.clone(),
                        expires_at: entry.expires_at,
                    },
                );
                self.record_read(true);
                Some(entry.value)
            }
            Ok(None) => {
                self.record_read(false);
                options.default_value
            }
            Err(err) => {
                self.log_failure("Get data failed", &logical, &err);
                self.record_read(false);
                options.default_value
            }
        }
    }

    /// Typed read; None on a miss or when the stored value has another shape.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.get(key, GetOptions::default())?;
        serde_json::from_value(value).ok()
    }

    // == Has ==
    pub fn has(&mut self, key: &str) -> bool {
        let Ok(logical) = self.namespace.normalize(key) else {
            return false;
        };

        let now = self.clock.now_ms();
        if let Some(mirrored) = self.mirror.get(&logical) {
            if !mirrored.is_expired(now) {
                return true;
            }
            self.expire_key(&logical);
            return false;
        }

        match self.read_entry(&logical, false) {
            Ok(Some(entry)) => {
                self.mirror.insert(
                    logical,
                    MirrorEntry {
                        value: entry.value,
                        expires_at: entry.expires_at,
                    },
                );
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.log_failure("Has key check failed", &logical, &err);
                false
            }
        }
    }

    // == Remove ==
    /// Removes `key`. Removing a key that does not exist succeeds and emits nothing.
    pub fn remove(&mut self, key: &str) -> bool {
        if !self.supported {
            let err = CacheError::Unsupported(self.unsupported_message.clone());
            self.log_failure("Remove data failed", key, &err);
            return false;
        }

        let (logical, physical) = match self.keys_for(key) {
            Ok(keys) => keys,
            Err(err) => {
                self.log_failure("Remove data failed", key, &err);
                return false;
            }
        };

        let stored = matches!(self.store.get(&physical), Ok(Some(_)));
        if let Err(err) = self.store.remove(&physical) {
            self.log_failure("Remove data failed", &logical, &err);
            return false;
        }

        let previous = self.mirror.remove(&logical);
        if stored || previous.is_some() {
            if self.flags.enable_metrics {
                self.metrics.record_removal();
            }
            self.emit(
                &logical,
                previous.map(|m| m.value),
                None,
                ChangeAction::Remove,
            );
            self.log_event("Data removed", &logical);
        }
        true
    }

    pub fn remove_many<S: AsRef<str>>(&mut self, keys: &[S]) -> RemoveManyResult {
        let mut result = RemoveManyResult::default();
        for key in keys {
            let key = key.as_ref();
            if self.remove(key) {
                result.success.push(key.to_string());
            } else {
                result.failed.push(key.to_string());
            }
        }
        result
    }

    // == Clear ==
    /// Removes every physical key under this namespace.
    ///
    /// Emits one `clear` event per key that was in the mirror.
    pub fn clear(&mut self) -> bool {
        if !self.supported {
            let err = CacheError::Unsupported(self.unsupported_message.clone());
            self.log_failure("Clear all failed", "", &err);
            return false;
        }

        let physical_keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(err) => {
                self.log_failure("Clear all failed", "", &err);
                return false;
            }
        };

        let mut removed = 0;
        let mut ok = true;
        for (physical, logical) in &physical_keys {
            match self.store.remove(physical) {
                Ok(()) => removed += 1,
                Err(err) => {
                    self.log_failure("Clear item failed", logical, &err);
                    ok = false;
                }
            }
        }

        let mut mirrored: Vec<(String, MirrorEntry)> = self.mirror.drain().collect();
        mirrored.sort_by(|a, b| a.0.cmp(&b.0));
        for (logical, entry) in mirrored {
            self.emit(&logical, Some(entry.value), None, ChangeAction::Clear);
        }

        if self.config.enable_logging {
            debug!(prefix = %self.config.prefix, removed, "All data cleared");
        }
        ok
    }

    // == Conditional Writes ==
    /// Reads the current value (None if absent), applies `update` and stores
    /// the result. Not atomic with respect to other writers of the backend.
    pub fn update_if_present<F>(&mut self, key: &str, update: F, options: PutOptions) -> bool
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let current = self.get(
            key,
            GetOptions {
                decrypt: options.encrypt,
                default_value: None,
            },
        );
        let next = update(current);
        match self.put_value(key, next, options) {
            Ok(stored) => stored,
            Err(err) => {
                self.log_failure("Update data failed", key, &err);
                false
            }
        }
    }

    /// Stores `value` only if `key` holds no live entry.
    pub fn put_if_absent<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: PutOptions,
    ) -> Result<bool> {
        if self.has(key) {
            return Ok(false);
        }
        self.put(key, value, options)
    }

    // == Stats ==
    /// Re-enumerates the backend; sizes are those of the stored strings.
    pub fn stats(&self) -> StorageStats {
        let quota = self.config.quota_bytes;
        let mut stats = StorageStats::empty(quota);
        if !self.supported {
            return stats;
        }

        let physical_keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(err) => {
                self.log_failure("Get storage stats failed", "", &err);
                return stats;
            }
        };

        for (physical, logical) in physical_keys {
            let Ok(Some(raw)) = self.store.get(&physical) else {
                continue;
            };
            let size_bytes = raw.len();
            let item = match self.decode_raw(&raw, false) {
                Ok(entry) => ItemStats {
                    key: logical,
                    size_bytes,
                    created_at: entry.created_at,
                    has_expiry: entry.expires_at.is_some(),
                },
                Err(_) => ItemStats {
                    key: logical,
                    size_bytes,
                    created_at: 0,
                    has_expiry: false,
                },
            };
            stats.push(item);
        }
        stats.finish(quota)
    }

    /// Logical keys currently stored under this namespace, sorted.
    pub fn keys(&self) -> Vec<String> {
        match self.namespace_keys() {
            Ok(keys) => {
                let mut logical: Vec<String> = keys.into_iter().map(|(_, l)| l).collect();
                logical.sort();
                logical
            }
            Err(err) => {
                self.log_failure("List keys failed", "", &err);
                Vec::new()
            }
        }
    }

    /// Snapshot of the mirror.
    pub fn storage_data(&self) -> BTreeMap<String, Value> {
        self.mirror
            .iter()
            .map(|(k, m)| (k.clone(), m.value.clone()))
            .collect()
    }

    // == Watch ==
    /// Current value of `key` followed by every distinct subsequent value.
    pub fn watch(&mut self, key: &str) -> Result<Subscription<Option<Value>>> {
        let logical = self.namespace.normalize(key)?;
        let current = self.get(&logical, GetOptions::default());
        Ok(self.notifier.subscribe_key(logical, current))
    }

    pub fn watch_all(&mut self) -> Subscription<ChangeEvent> {
        self.notifier.subscribe_all()
    }

    /// Changes to any of `keys`; empty keys are ignored.
    pub fn watch_keys<S: AsRef<str>>(&mut self, keys: &[S]) -> Subscription<KeyChange> {
        let keys: HashSet<String> = keys
            .iter()
            .filter_map(|k| self.namespace.normalize(k.as_ref()).ok())
            .collect();
        self.notifier.subscribe_keys(keys)
    }

    /// Changes to keys matching `pattern`, where `*` matches anything.
    ///
    /// The pattern is case-folded the same way keys are.
    pub fn watch_pattern(&mut self, pattern: &str) -> Result<Subscription<KeyChange>> {
        let folded = self.namespace.fold(pattern);
        self.notifier.subscribe_pattern(&folded)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Ends every open subscription.
    pub fn destroy(&mut self) {
        self.notifier.close_all();
        self.log_event("Engine destroyed", "");
    }

    // == Accessors ==
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn flags(&self) -> CacheFlags {
        self.flags
    }

    pub fn storage_type(&self) -> StorageType {
        self.store.storage_type()
    }

    pub fn is_storage_supported(&self) -> bool {
        self.supported
    }

    pub fn is_encryption_supported(&self) -> bool {
        self.cipher.is_supported()
    }

    /// Derives the encryption key up front instead of on the first
    /// encrypted read or write.
    pub fn prepare_encryption_key(&self) {
        self.cipher.prime_key();
    }

    pub fn is_encryption_key_ready(&self) -> bool {
        self.cipher.key_cached()
    }

    /// Drops the cached encryption key, e.g. before rotating the salt.
    pub fn clear_encryption_key(&mut self) {
        self.cipher.clear_key();
        self.log_event("Encryption key cleared", "");
    }

    /// Counters, when the `enable_metrics` flag is on.
    pub fn metrics(&self) -> Option<CacheMetrics> {
        self.flags.enable_metrics.then(|| self.metrics.clone())
    }

    // == Internals ==
    fn keys_for(&self, key: &str) -> Result<(String, String)> {
        let logical = self.namespace.normalize(key)?;
        let physical = self.namespace.to_physical(&logical)?;
        Ok((logical, physical))
    }

    /// `(physical, logical)` pairs for every key under this namespace.
    pub(crate) fn namespace_keys(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|physical| {
                let logical = self.namespace.to_logical(&physical)?;
                Some((physical, logical))
            })
            .collect())
    }

    /// Reads and decodes one entry. Expired entries are removed and reported
    /// as absent; undecodable ones are removed and reported as errors.
    fn read_entry(&mut self, logical: &str, decrypt_first: bool) -> Result<Option<Entry>> {
        let physical = self.namespace.to_physical(logical)?;
        let Some(raw) = self.store.get(&physical)? else {
            return Ok(None);
        };

        match self.decode_raw(&raw, decrypt_first) {
            Ok(entry) if entry.is_expired(self.clock.now_ms()) => {
                self.expire_key(logical);
                Ok(None)
            }
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                if let Err(remove_err) = self.store.remove(&physical) {
                    self.log_failure("Remove corrupt item failed", logical, &remove_err);
                }
                Err(err)
            }
        }
    }

    /// Plain JSON is parsed directly; anything else goes through the cipher.
    pub(crate) fn decode_raw(&self, raw: &str, decrypt_first: bool) -> Result<Entry> {
        if decrypt_first {
            return match self.cipher.decrypt(raw) {
                Ok(plain) => codec::decode(&plain),
                Err(err) if codec::is_plain_json(raw) => codec::decode(raw).map_err(|_| err),
                Err(err) => Err(err),
            };
        }

        if codec::is_plain_json(raw) {
            codec::decode(raw)
        } else {
            let plain = self.cipher.decrypt(raw)?;
            codec::decode(&plain)
        }
    }

    /// Deletes `logical` from the backend and the mirror; emits `expire` if it
    /// was mirrored.
    pub(crate) fn expire_key(&mut self, logical: &str) {
        if let Ok(physical) = self.namespace.to_physical(logical) {
            if let Err(err) = self.store.remove(&physical) {
                self.log_failure("Expire failed", logical, &err);
            }
        }
        if self.flags.enable_metrics {
            self.metrics.record_expiration();
        }
        if let Some(previous) = self.mirror.remove(logical) {
            self.emit(logical, Some(previous.value), None, ChangeAction::Expire);
        }
        self.log_event("Removed expired item", logical);
    }

    pub(crate) fn emit(
        &mut self,
        key: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        action: ChangeAction,
    ) {
        let event = ChangeEvent {
            key: key.to_string(),
            old_value,
            new_value,
            action,
            timestamp: self.clock.now_ms(),
        };
        let delivered = self.notifier.publish(&event);
        if self.config.enable_logging {
            debug!(key, action = ?action, delivered, "Change emitted");
        }
    }

    fn record_read(&mut self, hit: bool) {
        if !self.flags.enable_metrics {
            return;
        }
        if hit {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
    }

    pub(crate) fn log_event(&self, action: &str, key: &str) {
        if self.config.enable_logging {
            debug!(prefix = %self.config.prefix, key, "{}", action);
        }
    }

    pub(crate) fn log_failure(&self, action: &str, key: &str, err: &CacheError) {
        if self.config.enable_logging {
            warn!(prefix = %self.config.prefix, key, error = %err, "{}", action);
        }
    }
}
