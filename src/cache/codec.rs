//! Entry codec: `Entry` <-> storage-safe JSON string.

use crate::cache::Entry;
use crate::error::{CacheError, Result};

pub fn encode(entry: &Entry) -> Result<String> {
    serde_json::to_string(entry).map_err(|e| CacheError::MalformedEntry(e.to_string()))
}

/// Fails with `CacheError::MalformedEntry` if `raw` is not an entry object.
pub fn decode(raw: &str) -> Result<Entry> {
    serde_json::from_str(raw).map_err(|e| CacheError::MalformedEntry(e.to_string()))
}

/// True if `raw` parses as any JSON document.
///
/// This is how readers tell plaintext records from encrypted ones.
pub fn is_plain_json(raw: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(raw).is_ok()
}
