//! Key Namespace Module
//!
//! Maps logical keys to physical `"<prefix>:<normalized>"` keys and back.

use crate::error::{CacheError, Result};

const SEPARATOR: char = ':';

// == Key Namespace ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    /// `"<prefix>:"`
    head: String,
    case_sensitive: bool,
}

impl KeyNamespace {
    pub fn new(prefix: &str, case_sensitive: bool) -> Self {
        Self {
            head: format!("{}{}", prefix, SEPARATOR),
            case_sensitive,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.head[..self.head.len() - SEPARATOR.len_utf8()]
    }

    // == Normalize ==
    /// Case-folds `key` unless the namespace is case sensitive.
    ///
    /// Fails with `CacheError::InvalidKey` on an empty key.
    pub fn normalize(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey(
                "Storage key must be a non-empty string".to_string(),
            ));
        }
        Ok(self.fold(key))
    }

    /// Same folding as [`KeyNamespace::normalize`] without validation.
    pub fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    // == To Physical ==
    pub fn to_physical(&self, key: &str) -> Result<String> {
        let normalized = self.normalize(key)?;
        Ok(format!("{}{}", self.head, normalized))
    }

    // == To Logical ==
    /// Strips the prefix; None if `physical` is outside this namespace.
    pub fn to_logical(&self, physical: &str) -> Option<String> {
        physical
            .strip_prefix(self.head.as_str())
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    pub fn owns(&self, physical: &str) -> bool {
        self.to_logical(physical).is_some()
    }
}
