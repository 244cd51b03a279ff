//! Cache reconciler: create-if-absent population of the shared cache.
//!
//! Cards are stored in per-partition hashes keyed by card date. A card
//! is written at most once: the existence pre-check skips the object
//! fetch for already-cached dates, and the conditional hash write
//! resolves the race when two instances reconcile the same card at the
//! same time. The loser's work is discarded, never merged.

use std::sync::Arc;

use cardbox_core::{filter, normalize, Card, FilterMetadata, FilterQuery, ParseError};
use cardbox_store::{KeySpace, KeyValueStore, ObjectStore};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{SyncError, SyncResult};

/// Populates and reads the shared card cache.
#[derive(Clone)]
pub struct CacheReconciler {
    store: Arc<dyn ObjectStore>,
    kv: Arc<dyn KeyValueStore>,
    keys: KeySpace,
}

impl CacheReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, kv: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self { store, kv, keys }
    }

    /// Reconcile one scanned card into its cache partition.
    ///
    /// Returns the card when this call created the cache entry, `None`
    /// when the entry already existed, the conditional write lost a
    /// race, or the report payload was unusable. Store failures
    /// propagate.
    #[instrument(skip(self, meta), fields(card_date = %meta.day))]
    pub async fn reconcile(&self, meta: &FilterMetadata) -> SyncResult<Option<Card>> {
        if meta.object_name.is_empty() {
            warn!("card metadata has no object name");
            return Ok(None);
        }

        let partition = self.keys.cache(&meta.environment, &meta.protocol);
        if self.kv.hash_exists(&partition, &meta.day).await? {
            return Ok(None);
        }

        let bytes = self.store.get(&meta.object_name).await?;
        let mut report: Value = match serde_json::from_slice(&bytes) {
            Ok(report) => report,
            Err(e) => {
                let err = ParseError::MalformedJson {
                    reason: e.to_string(),
                };
                warn!(object = %meta.object_name, error = %err, "skipping card");
                return Ok(None);
            }
        };
        let stats = normalize(&mut report);
        debug!(runner = stats.runner.as_str(), "normalized report");

        let card = Card {
            filter_metadata: meta.clone(),
            html_report: format!("{}/index.html", meta.day),
            report,
            root_dir: meta.root_dir.clone(),
        };
        let payload = serde_json::to_string(&card).map_err(|e| SyncError::MalformedCard {
            card_date: meta.day.clone(),
            reason: e.to_string(),
        })?;

        if self.kv.hash_set_if_absent(&partition, &meta.day, &payload).await? {
            debug!(partition = %partition, "cached new card");
            Ok(Some(card))
        } else {
            // Another instance won the race after our pre-check.
            debug!(partition = %partition, "lost reconcile race");
            Ok(None)
        }
    }

    /// Reconcile a batch of scanned cards, returning how many entries
    /// this call created.
    pub async fn refresh(&self, cards: &[FilterMetadata]) -> SyncResult<usize> {
        let mut created = 0;
        for meta in cards {
            if self.reconcile(meta).await?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Cached cards matching `query`, newest first by start time.
    ///
    /// Fans out over every `(environment, protocol)` partition given.
    /// Entries that no longer deserialize are skipped and logged.
    pub async fn cached_cards(
        &self,
        partitions: &[(String, String)],
        query: &FilterQuery,
    ) -> SyncResult<Vec<Card>> {
        let mut cards = Vec::new();
        for (environment, protocol) in partitions {
            let partition = self.keys.cache(environment, protocol);
            for (card_date, payload) in self.kv.hash_get_all(&partition).await? {
                let card: Card = match serde_json::from_str(&payload) {
                    Ok(card) => card,
                    Err(e) => {
                        warn!(partition = %partition, card_date = %card_date, error = %e,
                            "unreadable cache entry");
                        continue;
                    }
                };
                if filter::validate(&card.filter_metadata, query).is_none() {
                    cards.push(card);
                }
            }
        }
        // startTime is RFC 3339, so string order is chronological.
        cards.sort_by(|a, b| {
            b.start_time()
                .unwrap_or_default()
                .cmp(a.start_time().unwrap_or_default())
        });
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbox_core::{parse_report_key, FetchSource};
    use cardbox_store::{InMemoryKeyValueStore, InMemoryObjectStore};
    use chrono::Utc;

    fn recent_day() -> String {
        Utc::now().format("%m-%d-%Y_%I-%M-%S_%p").to_string()
    }

    fn playwright_report(start_time: &str) -> String {
        serde_json::json!({
            "config": {"workers": 4},
            "suites": [{"title": "login"}],
            "stats": {
                "startTime": start_time,
                "expected": 10,
                "unexpected": 1,
                "skipped": 0,
                "duration": 1234.5
            }
        })
        .to_string()
    }

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        reconciler: CacheReconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryObjectStore::new());
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let reconciler = CacheReconciler::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            kv,
            KeySpace::new("cardbox"),
        );
        Fixture { store, reconciler }
    }

    fn seed(store: &InMemoryObjectStore, day: &str, start_time: &str) -> FilterMetadata {
        let key = format!("root/test_reports/loan/qa/api/{day}/report.json");
        store.put(&key, playwright_report(start_time).into_bytes());
        parse_report_key(&key).expect("parse")
    }

    #[tokio::test]
    async fn first_reconcile_creates_the_entry() {
        let f = fixture();
        let day = recent_day();
        let meta = seed(&f.store, &day, "2025-12-31T08:30:00.000Z");

        let card = f.reconciler.reconcile(&meta).await.expect("reconcile");
        let card = card.expect("created");
        assert_eq!(card.card_date(), day);
        assert_eq!(card.html_report, format!("{day}/index.html"));
        assert_eq!(card.start_time(), Some("2025-12-31T08:30:00.000Z"));
        // Heavy fields are stripped before caching.
        assert!(card.report.get("suites").is_none());
        assert!(card.report.get("config").is_none());
    }

    #[tokio::test]
    async fn second_reconcile_is_a_noop() {
        let f = fixture();
        let meta = seed(&f.store, &recent_day(), "2025-12-31T08:30:00.000Z");

        assert!(f.reconciler.reconcile(&meta).await.expect("first").is_some());
        assert!(f.reconciler.reconcile(&meta).await.expect("second").is_none());
    }

    #[tokio::test]
    async fn malformed_report_is_skipped_not_fatal() {
        let f = fixture();
        let day = recent_day();
        let key = format!("root/test_reports/loan/qa/api/{day}/report.json");
        f.store.put(&key, b"not json".to_vec());
        let meta = parse_report_key(&key).expect("parse");

        assert!(f.reconciler.reconcile(&meta).await.expect("reconcile").is_none());
    }

    #[tokio::test]
    async fn missing_object_propagates_store_error() {
        let f = fixture();
        let key = "root/test_reports/loan/qa/api/gone/report.json";
        let meta = parse_report_key(key).expect("parse");

        let err = f.reconciler.reconcile(&meta).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
    }

    #[tokio::test]
    async fn refresh_counts_only_new_entries() {
        let f = fixture();
        let a = seed(&f.store, "run-a", "2025-12-31T08:30:00.000Z");
        let b = seed(&f.store, "run-b", "2025-12-31T09:30:00.000Z");

        assert_eq!(f.reconciler.refresh(&[a.clone(), b.clone()]).await.expect("refresh"), 2);
        assert_eq!(f.reconciler.refresh(&[a, b]).await.expect("refresh"), 0);
    }

    #[tokio::test]
    async fn cached_cards_filter_and_sort_newest_first() {
        let f = fixture();
        // Distinct card dates so both land in the same partition hash.
        let now = Utc::now();
        let day_old = (now - chrono::Duration::seconds(30))
            .format("%m-%d-%Y_%I-%M-%S_%p")
            .to_string();
        let day_new = now.format("%m-%d-%Y_%I-%M-%S_%p").to_string();
        let older = seed(&f.store, &day_old, "2025-12-31T08:30:00.000Z");
        let newer = seed(&f.store, &day_new, "2025-12-31T10:30:00.000Z");
        f.reconciler.refresh(&[older, newer]).await.expect("refresh");

        let partitions = vec![("qa".to_string(), "api".to_string())];
        let query = FilterQuery::any(365_000, FetchSource::Local);
        let cards = f
            .reconciler
            .cached_cards(&partitions, &query)
            .await
            .expect("read");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].card_date(), day_new);
        assert_eq!(cards[1].card_date(), day_old);
    }

    #[tokio::test]
    async fn cached_cards_of_empty_partitions_is_empty() {
        let f = fixture();
        let partitions = vec![("qa".to_string(), "api".to_string())];
        let cards = f
            .reconciler
            .cached_cards(&partitions, &FilterQuery::any(1, FetchSource::Local))
            .await
            .expect("read");
        assert!(cards.is_empty());
    }
}
