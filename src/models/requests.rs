//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::PutOptions;

/// Longest logical key accepted over HTTP
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The logical key to store the value under
/// - `value`: Any JSON value
/// - `ttl_minutes`: Optional TTL in minutes (the engine default applies if absent)
/// - `encrypt`: Encrypt the record at rest
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in minutes
    #[serde(default)]
    pub ttl_minutes: Option<u64>,
    /// Encrypt before writing
    #[serde(default)]
    pub encrypt: bool,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.chars().count() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }

    /// Engine write options carried by this request
    pub fn put_options(&self) -> PutOptions {
        PutOptions {
            encrypt: self.encrypt,
            ttl_minutes: self.ttl_minutes,
        }
    }
}

/// Query string for GET /get/:key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetQuery {
    /// Try decryption before plain decoding
    #[serde(default)]
    pub decrypt: bool,
}
