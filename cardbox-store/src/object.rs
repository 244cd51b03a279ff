//! Object store trait and in-memory implementation.
//!
//! The engine needs three operations against the artifact bucket:
//! a full listing (paginated internally, never truncated at the
//! store's default page size), a single-object fetch, and a download
//! to a local path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use cardbox_core::Timestamp;

use crate::error::{StoreError, StoreResult};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub last_modified: Timestamp,
}

/// Async object store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object in the store, newest first.
    ///
    /// Implementations must page through all results; returning only
    /// the first page is a contract violation.
    async fn list_all(&self) -> StoreResult<Vec<ObjectMeta>>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Download an object to a local path, creating parent directories.
    async fn download_to(&self, key: &str, local_path: &Path) -> StoreResult<()>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: Timestamp,
}

/// In-memory object store for tests and single-node development.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object stamped with the current time.
    pub fn put(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.put_at(key, data, chrono::Utc::now());
    }

    /// Insert an object with an explicit last-modified timestamp.
    pub fn put_at(&self, key: &str, data: impl Into<Vec<u8>>, last_modified: Timestamp) {
        let mut objects = match self.objects.write() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    /// Remove an object. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) {
        let mut objects = match self.objects.write() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        objects.remove(key);
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_all(&self) -> StoreResult<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut listing: Vec<ObjectMeta> = objects
            .iter()
            .map(|(key, obj)| ObjectMeta {
                key: key.clone(),
                last_modified: obj.last_modified,
            })
            .collect();
        listing.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(listing)
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        objects
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn download_to(&self, key: &str, local_path: &Path) -> StoreResult<()> {
        let data = self.get(key).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent.display().to_string(), &e))?;
        }
        tokio::fs::write(local_path, data)
            .await
            .map_err(|e| StoreError::io(local_path.display().to_string(), &e))
    }
}
