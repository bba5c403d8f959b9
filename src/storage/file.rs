//! File backend
//!
//! Persistent storage kept as a single JSON object on disk. Every mutation is
//! written through via a temp file and rename; a failed write is rolled back
//! in memory.
//!
//! All handles opened on the same file within a process share one item map,
//! so engines with different prefixes never overwrite each other's records.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::warn;

use crate::error::{CacheError, Result};
use crate::storage::memory::{lock, ItemMap};
use crate::storage::KeyValueStore;

// == Open Files ==
type SharedMap = Arc<Mutex<ItemMap>>;

/// Canonical path -> live item map. Entries die with their last handle.
fn open_files() -> &'static Mutex<HashMap<PathBuf, Weak<Mutex<ItemMap>>>> {
    static OPEN_FILES: OnceLock<Mutex<HashMap<PathBuf, Weak<Mutex<ItemMap>>>>> = OnceLock::new();
    OPEN_FILES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Absolute form of `path` with its parent resolved; the file itself may not exist yet.
fn canonical_path(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    let parent = parent.canonicalize().map_err(|e| {
        CacheError::Unavailable(format!("cannot resolve {}: {}", parent.display(), e))
    })?;
    match path.file_name() {
        Some(name) => Ok(parent.join(name)),
        None => Err(CacheError::Unavailable(format!(
            "{} is not a file path",
            path.display()
        ))),
    }
}

fn load_items(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| CacheError::Unavailable(format!("cannot read {}: {}", path.display(), e)))?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str::<BTreeMap<String, String>>(&raw)
        .map_err(|e| CacheError::Unavailable(format!("corrupt store {}: {}", path.display(), e)))
}

// == File Backend ==
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    inner: SharedMap,
}

impl FileBackend {
    /// Opens (or creates) the store at `path`.
    ///
    /// If the file is already open in this process the existing map is
    /// shared, and the first opener's quota stays in force. Fails with
    /// `CacheError::Unavailable` when the directory cannot be created or the
    /// existing file cannot be read as a string map.
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CacheError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let path = canonical_path(path)?;

        let mut open = open_files().lock().unwrap_or_else(|p| p.into_inner());
        open.retain(|_, map| map.strong_count() > 0);
        if let Some(inner) = open.get(&path).and_then(Weak::upgrade) {
            return Ok(Self { path, inner });
        }

        let items = load_items(&path)?;
        let inner: SharedMap = Arc::new(Mutex::new(ItemMap::from_items(items, Some(quota_bytes))));
        open.insert(path.clone(), Arc::downgrade(&inner));
        Ok(Self { path, inner })
    }

    /// True if both handles write to the same in-process map.
    pub fn shares_map_with(&self, other: &FileBackend) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &ItemMap) -> Result<()> {
        let data = serde_json::to_vec(map.items())
            .map_err(|e| CacheError::Internal(format!("serialize store: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileBackend {
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
        let mut map = lock(&self.inner);
        let previous = map.set(key, value)?;
        if let Err(e) = self.flush(&map) {
            warn!(path = %self.path.display(), error = %e, "write-through failed, rolling back");
            map.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut map = lock(&self.inner);
        let Some(previous) = map.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush(&map) {
            warn!(path = %self.path.display(), error = %e, "write-through failed, rolling back");
            map.restore(key, Some(previous));
            return Err(e);
        }
        Ok(())
    }
}
