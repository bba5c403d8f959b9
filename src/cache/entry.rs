//! Cache Entry Module
//!
//! The persisted record for one logical key, with TTL support.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const MS_PER_MINUTE: u64 = 60 * 1000;

// == Entry ==
/// Represents a stored value and its metadata.
///
/// Persisted as `{"value": .., "timestamp": .., "expiry": ..?, "encrypted": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    #[serde(rename = "timestamp")]
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    #[serde(rename = "expiry", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Whether the serialized form was encrypted before storage
    #[serde(default)]
    pub encrypted: bool,
}

impl Entry {
    // == Constructor ==
    /// Creates a new entry at `now` with a TTL in minutes (0 = never expires).
    pub fn new(value: Value, now: u64, ttl_minutes: u64, encrypted: bool) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: expiry_from_ttl(now, ttl_minutes),
            encrypted,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is still live at exactly `expires_at` and expired one
    /// millisecond after.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now > expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self, now: u64) -> Option<u64> {
        self.expires_at.map(|expires| expires.saturating_sub(now))
    }
}

/// Absolute expiry for a TTL in minutes; 0 means none.
pub fn expiry_from_ttl(now: u64, ttl_minutes: u64) -> Option<u64> {
    if ttl_minutes > 0 {
        Some(now.saturating_add(ttl_minutes.saturating_mul(MS_PER_MINUTE)))
    } else {
        None
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = Entry::new(json!("test_value"), NOW, 0, false);

        assert_eq!(entry.value, json!("test_value"));
        assert_eq!(entry.created_at, NOW);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = Entry::new(json!(42), NOW, 2, false);

        assert_eq!(entry.expires_at, Some(NOW + 120_000));
        assert!(!entry.is_expired(NOW));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = Entry::new(json!(1), NOW, 1, false);
        let expires = NOW + 60_000;

        assert!(!entry.is_expired(expires), "Entry is live at its expiry instant");
        assert!(entry.is_expired(expires + 1));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = Entry::new(json!(1), NOW, 1, false);

        assert_eq!(entry.ttl_remaining_ms(NOW), Some(60_000));
        assert_eq!(entry.ttl_remaining_ms(NOW + 59_000), Some(1_000));
        assert_eq!(entry.ttl_remaining_ms(NOW + 120_000), Some(0));
        assert_eq!(Entry::new(json!(1), NOW, 0, false).ttl_remaining_ms(NOW), None);
    }

    #[test]
    fn test_serialized_field_names() {
        let entry = Entry::new(json!({"a": 1}), NOW, 1, true);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["value"], json!({"a": 1}));
        assert_eq!(json["timestamp"], json!(NOW));
        assert_eq!(json["expiry"], json!(NOW + 60_000));
        assert_eq!(json["encrypted"], json!(true));
    }

    #[test]
    fn test_missing_expiry_is_omitted() {
        let entry = Entry::new(json!("v"), NOW, 0, false);
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("expiry").is_none());
    }
}
