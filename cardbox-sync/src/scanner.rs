//! Remote scanner: object-store listings to card metadata.
//!
//! Lists the artifact bucket, keeps only keys that fit the report
//! path template, and optionally filters the survivors against a
//! query. Keys that do not fit the template are skipped silently;
//! the bucket also holds HTML pages, traces, and screenshots, so a
//! non-report key is the common case, never an anomaly.

use std::sync::Arc;

use cardbox_core::{filter, parse_report_key, FilterMetadata, FilterQuery, ParseError};
use cardbox_store::ObjectStore;
use tracing::{debug, instrument, trace};

use crate::error::SyncResult;

/// Scans the object store for report cards.
#[derive(Clone)]
pub struct RemoteScanner {
    store: Arc<dyn ObjectStore>,
}

impl RemoteScanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// All report cards currently in the store, newest first.
    ///
    /// Ordering comes from the store listing (last-modified,
    /// descending) and is preserved here.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> SyncResult<Vec<FilterMetadata>> {
        let listing = self.store.list_all().await?;
        let total = listing.len();
        let cards: Vec<FilterMetadata> = listing
            .iter()
            .filter_map(|meta| match parse_report_key(&meta.key) {
                Ok(card) => Some(card),
                // HTML pages, traces, screenshots: the common case.
                Err(ParseError::WrongFilename { .. }) => None,
                Err(e) => {
                    // A report.json in the wrong place is schema drift.
                    trace!(key = %meta.key, error = %e, "skipping unparseable key");
                    None
                }
            })
            .collect();
        debug!(objects = total, cards = cards.len(), "scanned object store");
        Ok(cards)
    }

    /// Report cards matching `query`, newest first.
    #[instrument(skip(self, query))]
    pub async fn scan_matching(&self, query: &FilterQuery) -> SyncResult<Vec<FilterMetadata>> {
        let mut cards = self.scan().await?;
        cards.retain(|card| match filter::validate(card, query) {
            None => true,
            Some(mismatch) => {
                debug!(card_date = %card.day, field = mismatch.field, %mismatch, "filtered out");
                false
            }
        });
        Ok(cards)
    }

    /// Raw object count, the publisher's change-detection signal.
    ///
    /// Counts every object in the bucket, not just report keys: a new
    /// run adds its whole folder at once, so any growth implies new
    /// cards without the cost of parsing each key.
    pub async fn total_objects(&self) -> SyncResult<usize> {
        Ok(self.store.list_all().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbox_core::{FetchSource, MatchField};
    use cardbox_store::InMemoryObjectStore;
    use chrono::{Duration, Utc};

    fn recent_day() -> String {
        Utc::now().format("%m-%d-%Y_%I-%M-%S_%p").to_string()
    }

    fn seed_report(store: &InMemoryObjectStore, app: &str, env: &str, protocol: &str, day: &str) {
        let folder = format!("root/test_reports/{app}/{env}/{protocol}/{day}");
        store.put(&format!("{folder}/report.json"), b"{}".to_vec());
        store.put(&format!("{folder}/index.html"), b"<html>".to_vec());
    }

    #[tokio::test]
    async fn scan_keeps_only_report_keys() {
        let store = Arc::new(InMemoryObjectStore::new());
        let day = recent_day();
        seed_report(&store, "loan", "qa", "api", &day);
        store.put("root/misc/notes.txt", b"x".to_vec());

        let scanner = RemoteScanner::new(store);
        let cards = scanner.scan().await.expect("scan");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].app, "loan");
        assert_eq!(cards[0].day, day);
    }

    #[tokio::test]
    async fn scan_skips_shallow_report_keys() {
        let store = Arc::new(InMemoryObjectStore::new());
        let day = recent_day();
        seed_report(&store, "loan", "qa", "api", &day);
        // A report.json too shallow for the path template.
        store.put("root/test_reports/report.json", b"{}".to_vec());

        let scanner = RemoteScanner::new(store);
        let cards = scanner.scan().await.expect("scan");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].day, day);
    }

    #[tokio::test]
    async fn scan_preserves_newest_first_ordering() {
        let store = Arc::new(InMemoryObjectStore::new());
        let now = Utc::now();
        store.put_at(
            "root/r/loan/qa/api/older/report.json",
            b"{}".to_vec(),
            now - Duration::hours(1),
        );
        store.put_at("root/r/loan/qa/api/newer/report.json", b"{}".to_vec(), now);

        let scanner = RemoteScanner::new(store);
        let cards = scanner.scan().await.expect("scan");
        let days: Vec<&str> = cards.iter().map(|c| c.day.as_str()).collect();
        assert_eq!(days, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn scan_matching_applies_the_query() {
        let store = Arc::new(InMemoryObjectStore::new());
        let day = recent_day();
        seed_report(&store, "loan", "qa", "api", &day);
        seed_report(&store, "loan", "dev", "api", &day);
        seed_report(&store, "billing", "qa", "ui", &day);

        let scanner = RemoteScanner::new(store);
        let query = FilterQuery {
            app: MatchField::Any,
            environment: MatchField::Exact("qa".to_string()),
            protocol: MatchField::Any,
            day: 1,
            source: FetchSource::Remote,
        };
        let cards = scanner.scan_matching(&query).await.expect("scan");
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|c| c.environment == "qa"));
    }

    #[tokio::test]
    async fn scan_matching_drops_stale_cards() {
        let store = Arc::new(InMemoryObjectStore::new());
        seed_report(&store, "loan", "qa", "api", "2020-01-01-08-30-00");

        let scanner = RemoteScanner::new(store);
        let cards = scanner
            .scan_matching(&FilterQuery::any(1, FetchSource::Remote))
            .await
            .expect("scan");
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn total_objects_counts_everything() {
        let store = Arc::new(InMemoryObjectStore::new());
        seed_report(&store, "loan", "qa", "api", &recent_day());
        store.put("root/misc/notes.txt", b"x".to_vec());

        let scanner = RemoteScanner::new(store);
        assert_eq!(scanner.total_objects().await.expect("count"), 3);
    }
}
