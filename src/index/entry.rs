//! Index Entry definitions
//!
//! One entry maps a cache key to a blob digest and an expiry time. On disk
//! the digest and expiry travel as a single string value:
//!
//! ```text
//! <sha512 hex>;<YYYY-MM-DDThh:mm:ss>
//! ```

use chrono::{DateTime, Utc};

use crate::blob::is_valid_digest;
use crate::clock::{format_timestamp, parse_timestamp, truncate_to_seconds};
use crate::error::{Result, ZealotError};

/// Separator between digest and timestamp. Never appears in a hex digest.
pub const VALUE_SEPARATOR: char = ';';

/// A single index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Logical cache key
    pub key: String,

    /// Digest of the blob holding the value
    pub digest: String,

    /// Last instant (UTC, whole seconds) at which the entry is still valid
    pub expires_at: DateTime<Utc>,
}

impl IndexEntry {
    /// Build an entry. `expires_at` is truncated to whole seconds, the
    /// precision the index stores.
    pub fn new(key: impl Into<String>, digest: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            digest: digest.into(),
            expires_at: truncate_to_seconds(expires_at),
        }
    }

    /// An entry expires strictly after `expires_at`; equality is still valid
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Encode digest and expiry as the stored value string
    pub fn encode_value(&self) -> String {
        format!(
            "{}{}{}",
            self.digest,
            VALUE_SEPARATOR,
            format_timestamp(self.expires_at)
        )
    }

    /// Rebuild an entry from a key and its stored value string
    pub fn decode_value(key: &str, value: &str) -> Result<Self> {
        let (digest, timestamp) = value.split_once(VALUE_SEPARATOR).ok_or_else(|| {
            ZealotError::IndexCorruption(format!("value for {:?} has no separator", key))
        })?;

        if !is_valid_digest(digest) {
            return Err(ZealotError::IndexCorruption(format!(
                "value for {:?} has malformed digest",
                key
            )));
        }

        let expires_at = parse_timestamp(timestamp).ok_or_else(|| {
            ZealotError::IndexCorruption(format!(
                "value for {:?} has malformed timestamp {:?}",
                key, timestamp
            ))
        })?;

        Ok(Self {
            key: key.to_string(),
            digest: digest.to_string(),
            expires_at,
        })
    }
}
