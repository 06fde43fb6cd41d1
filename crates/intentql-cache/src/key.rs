//! Content-hash cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the canonical JSON form of `key`.
///
/// Maps serialize with sorted keys, so two keys that differ only in map
/// insertion order hash the same. Returns `None` when `key` cannot be
/// serialized.
pub fn content_hash<K: Serialize + ?Sized>(key: &K) -> Option<String> {
    let canonical = serde_json::to_value(key)
        .and_then(|value| serde_json::to_vec(&value))
        .map_err(|e| tracing::debug!(error = %e, "cache key is not serializable"))
        .ok()?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Some(format!("{:x}", hasher.finalize()))
}
