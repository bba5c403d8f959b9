//! Cipher Module
//!
//! AES-256-GCM over a PBKDF2-HMAC-SHA256 key. The salt (never the key) is
//! persisted so data written by one run can be read by the next.
//!
//! Ciphertext layout: `base64(iv[12] || ciphertext || tag[16])`.
//!
//! When built with [`Cipher::encoding_only`], values are merely base64
//! encoded. That fallback is reversible by anyone and is NOT encryption.

use std::fmt;
use std::sync::{Arc, Mutex};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use sha2::Sha256;
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::storage::KeyValueStore;

/// Well-known key holding the base64-encoded salt.
pub const SALT_KEY: &str = "__vault_cache_key_salt__";

pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

// == Cipher ==
pub struct Cipher {
    password: String,
    salt_store: Option<Arc<dyn KeyValueStore>>,
    supported: bool,
    /// Derived once, reused until `clear_key`
    key: Mutex<Option<[u8; KEY_LEN]>>,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("supported", &self.supported)
            .field("has_salt_store", &self.salt_store.is_some())
            .field("key_cached", &self.key_cached())
            .finish()
    }
}

impl Cipher {
    // == Constructors ==
    /// Authenticated cipher. `salt_store` keeps the salt between runs; without
    /// one, a fresh salt is drawn for every derivation.
    pub fn new(password: impl Into<String>, salt_store: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            password: password.into(),
            salt_store,
            supported: true,
            key: Mutex::new(None),
        }
    }

    /// Reversible base64 encoding only. Offers no confidentiality.
    pub fn encoding_only() -> Self {
        Self {
            password: String::new(),
            salt_store: None,
            supported: false,
            key: Mutex::new(None),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    // == Encrypt ==
    /// Encrypts `plaintext`, falling back to the reversible encoding if the
    /// cipher is unsupported or fails.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if !self.supported {
            return encode_fallback(plaintext);
        }
        self.seal(plaintext)
            .unwrap_or_else(|_| encode_fallback(plaintext))
    }

    // == Decrypt ==
    /// Decrypts data produced by [`Cipher::encrypt`].
    ///
    /// Records written with the fallback encoding are still accepted.
    /// Fails with `CacheError::Decryption` when neither form verifies.
    pub fn decrypt(&self, data: &str) -> Result<String> {
        if !self.supported {
            return decode_fallback(data);
        }
        match self.open(data) {
            Ok(plaintext) => Ok(plaintext),
            Err(err) => decode_fallback(data).map_err(|_| err),
        }
    }

    // == Clear Key ==
    /// Drops the cached key so the next operation re-derives it.
    pub fn clear_key(&self) {
        *self.key.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Derives and caches the key now so the first `encrypt`/`decrypt`
    /// does not pay for PBKDF2. No-op for an encoding-only cipher.
    pub fn prime_key(&self) {
        if self.supported {
            self.key();
        }
    }

    pub fn key_cached(&self) -> bool {
        self.key.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let cipher = self.aead()?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| CacheError::Internal(format!("Encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    fn open(&self, data: &str) -> Result<String> {
        let combined = general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| CacheError::Decryption(format!("invalid base64: {}", e)))?;

        if combined.len() < IV_LEN + TAG_LEN {
            return Err(CacheError::Decryption("ciphertext too short".to_string()));
        }

        let (iv, ciphertext) = combined.split_at(IV_LEN);
        let plaintext = self
            .aead()?
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CacheError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CacheError::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }

    fn aead(&self) -> Result<Aes256Gcm> {
        let key = self.key();
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CacheError::Internal(format!("Failed to create cipher: {}", e)))
    }

    fn key(&self) -> [u8; KEY_LEN] {
        let mut cached = self.key.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(key) = *cached {
            return key;
        }
        let salt = self.load_or_create_salt();
        let key = derive_key(&self.password, &salt);
        *cached = Some(key);
        key
    }

    fn load_or_create_salt(&self) -> [u8; SALT_LEN] {
        if let Some(store) = &self.salt_store {
            if let Ok(Some(encoded)) = store.get_item(SALT_KEY) {
                if let Some(salt) = parse_salt(&encoded) {
                    return salt;
                }
            }
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        if let Some(store) = &self.salt_store {
            // Unpersisted salt still works for this process
            if let Err(e) = store.set_item(SALT_KEY, &general_purpose::STANDARD.encode(salt)) {
                warn!(
                    error = %e,
                    "salt not persisted; data encrypted now is unreadable after restart"
                );
            }
        }
        salt
    }
}

fn parse_salt(encoded: &str) -> Option<[u8; SALT_LEN]> {
    let bytes = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    bytes.try_into().ok()
}

/// PBKDF2-HMAC-SHA256, 256-bit output.
pub fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Base64 of the UTF-8 bytes.
pub fn encode_fallback(plaintext: &str) -> String {
    general_purpose::STANDARD.encode(plaintext.as_bytes())
}

pub fn decode_fallback(data: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CacheError::Decryption(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| CacheError::Decryption(format!("not UTF-8: {}", e)))
}
