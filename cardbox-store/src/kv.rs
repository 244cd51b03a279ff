//! Shared key-value store trait and in-memory implementation.
//!
//! The trait mirrors the small slice of a networked KV store the
//! engine actually uses: plain get/set, atomic counters, a
//! conditional create with TTL (dedup locks), and hash operations
//! with a conditional field set (card cache). Implementations must
//! make the conditional operations atomic; they are the system's only
//! cross-process coordination primitives.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{StoreError, StoreResult};

/// Async key-value store operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value unconditionally.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Create a key with a TTL only if it does not already exist.
    ///
    /// Returns true to the single caller that created the key. This is
    /// the atomic primitive behind the download queue's dedup lock.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically add `by` to an integer counter, returning the new value.
    async fn increment(&self, key: &str, by: i64) -> StoreResult<i64>;

    /// Atomically subtract `by` from an integer counter, returning the new value.
    async fn decrement(&self, key: &str, by: i64) -> StoreResult<i64>;

    /// Set a hash field only if it is not already present.
    ///
    /// Returns true when the field was created. This is the atomic
    /// create-if-absent write behind cache reconciliation: two
    /// concurrent reconcilers racing on the same field never overwrite
    /// each other, the loser's write is silently dropped.
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str)
        -> StoreResult<bool>;

    /// Get a single hash field.
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Get all fields of a hash. An absent hash is an empty map.
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Whether a hash field exists.
    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hash_get(key, field).await?.is_some())
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Debug, Clone)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// In-memory key-value store for tests and single-node development.
///
/// TTLs use the tokio clock, so tests can drive expiry with
/// `tokio::time::pause` + `advance`.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    strings: RwLock<HashMap<String, StringEntry>>,
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let strings = self.strings.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(strings
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut strings = self.strings.write().map_err(|_| StoreError::LockPoisoned)?;
        strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut strings = self.strings.write().map_err(|_| StoreError::LockPoisoned)?;
        if strings.get(key).is_some_and(StringEntry::is_live) {
            return Ok(false);
        }
        strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut strings = self.strings.write().map_err(|_| StoreError::LockPoisoned)?;
        strings.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> StoreResult<i64> {
        let mut strings = self.strings.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = strings
            .get(key)
            .filter(|entry| entry.is_live())
            .and_then(|entry| entry.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + by;
        strings.insert(
            key.to_string(),
            StringEntry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn decrement(&self, key: &str, by: i64) -> StoreResult<i64> {
        self.increment(key, -by).await
    }

    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let mut hashes = self.hashes.write().map_err(|_| StoreError::LockPoisoned)?;
        let hash = hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let hashes = self.hashes.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(hashes.get(key).and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let hashes = self.hashes.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }
}
