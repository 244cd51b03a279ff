//! Download queue: a cross-process dedup lock.
//!
//! State machine per `(operation, identifier)`: free → in-progress →
//! free. `acquire` is a conditional create with TTL and returns true
//! only to the single winner among concurrent callers; `release`
//! deletes the key unconditionally. If a holder crashes without
//! releasing, TTL expiry returns the key to free — the system's only
//! crash-recovery mechanism, trading a bounded "appears busy" window
//! for never needing a heartbeat or ownership token.
//!
//! Losing callers must surface an "already in progress" status to
//! their own callers instead of retrying internally.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::StoreResult;
use crate::keys::KeySpace;
use crate::kv::KeyValueStore;

/// Operation name for report-folder downloads.
pub const OPERATION_DOWNLOAD: &str = "download";
/// Operation name for full cache reloads.
pub const OPERATION_RELOAD: &str = "reload";

/// TTL-bounded dedup lock over the shared key-value store.
#[derive(Clone)]
pub struct DownloadQueue {
    kv: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    ttl: Duration,
}

impl DownloadQueue {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeySpace, ttl: Duration) -> Self {
        Self { kv, keys, ttl }
    }

    /// Try to mark `(operation, identifier)` in-progress.
    ///
    /// Returns true only to the winner. The stored value records the
    /// status, start time, and any caller metadata for status queries.
    pub async fn acquire(
        &self,
        operation: &str,
        identifier: &str,
        metadata: Option<Value>,
    ) -> StoreResult<bool> {
        let key = self.keys.lock(operation, identifier);
        let mut value = json!({
            "status": "in-progress",
            "started_at": chrono::Utc::now().to_rfc3339(),
        });
        if let (Some(obj), Some(Value::Object(extra))) = (value.as_object_mut(), metadata) {
            obj.extend(extra);
        }
        let acquired = self
            .kv
            .set_if_absent_with_ttl(&key, &value.to_string(), self.ttl)
            .await?;
        if acquired {
            tracing::debug!(operation, identifier, "acquired dedup lock");
        } else {
            tracing::debug!(operation, identifier, "dedup lock already held");
        }
        Ok(acquired)
    }

    /// Return `(operation, identifier)` to free. Idempotent.
    pub async fn release(&self, operation: &str, identifier: &str) -> StoreResult<()> {
        let key = self.keys.lock(operation, identifier);
        self.kv.delete(&key).await?;
        tracing::debug!(operation, identifier, "released dedup lock");
        Ok(())
    }

    /// Current lock payload, or `None` when free.
    ///
    /// An unparseable payload is treated as free and logged; the TTL
    /// will clear it.
    pub async fn status(&self, operation: &str, identifier: &str) -> StoreResult<Option<Value>> {
        let key = self.keys.lock(operation, identifier);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(operation, identifier, error = %e, "malformed lock payload");
                Ok(None)
            }
        }
    }
}
