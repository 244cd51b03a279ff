//! Batch downloader for report folders.
//!
//! Downloads a card's whole report folder (HTML page, JSON report,
//! traces, screenshots) into the local mirror. Two guards shape the
//! fetch path:
//!
//! - the cross-process dedup lock: among concurrent instances asked to
//!   download the same folder, exactly one fetches; the rest report
//!   [`DownloadOutcome::InProgress`] and do not wait
//! - rate limiting: objects are fetched in fixed-size batches with a
//!   pause between batches (never within one), keeping the store's
//!   request rate bounded without slowing small folders down
//!
//! The lock is always released on the way out, success or failure;
//! the TTL covers the crash case.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cardbox_core::Card;
use cardbox_store::{DownloadQueue, ObjectStore, OPERATION_DOWNLOAD};
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::SyncResult;

/// Result of one folder download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// This instance fetched the folder.
    Completed { local_dir: PathBuf, files: usize },
    /// Another instance holds the folder's lock; nothing was fetched.
    InProgress,
}

/// Rate-limited, lock-guarded folder downloads.
#[derive(Clone)]
pub struct BatchDownloader {
    store: Arc<dyn ObjectStore>,
    queue: DownloadQueue,
    reports_dir: PathBuf,
    folder_batch_size: usize,
    file_batch_size: usize,
    rate_limit_wait: Duration,
}

impl BatchDownloader {
    pub fn new(store: Arc<dyn ObjectStore>, queue: DownloadQueue, config: &SyncConfig) -> Self {
        Self {
            store,
            queue,
            reports_dir: config.reports_dir.clone(),
            folder_batch_size: config.folder_batch_size.max(1),
            file_batch_size: config.file_batch_size.max(1),
            rate_limit_wait: config.rate_limit_wait,
        }
    }

    /// Download one card's report folder into the mirror.
    #[instrument(skip(self, card), fields(card_date = %card.card_date()))]
    pub async fn download_folder(&self, card: &Card) -> SyncResult<DownloadOutcome> {
        let identifier = card.card_date();
        let metadata = serde_json::json!({ "root_dir": card.root_dir });
        if !self
            .queue
            .acquire(OPERATION_DOWNLOAD, identifier, Some(metadata))
            .await?
        {
            debug!("folder download already in progress elsewhere");
            return Ok(DownloadOutcome::InProgress);
        }

        let result = self.fetch_folder(card).await;

        // Release on both paths; a failed release only extends the
        // "appears busy" window until the TTL clears it.
        if let Err(e) = self.queue.release(OPERATION_DOWNLOAD, identifier).await {
            warn!(error = %e, "failed to release download lock");
        }

        result
    }

    async fn fetch_folder(&self, card: &Card) -> SyncResult<DownloadOutcome> {
        let prefix = format!("{}/", card.root_dir);
        // Folder-marker objects (key == prefix) carry no payload and
        // would target the directory itself; drop them here.
        let keys: Vec<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|meta| meta.key.starts_with(&prefix) && meta.key.len() > prefix.len())
            .map(|meta| meta.key)
            .collect();

        let local_dir = self.reports_dir.join(card.card_date());
        let mut files = 0;
        for (i, batch) in keys.chunks(self.file_batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.rate_limit_wait).await;
            }
            for key in batch {
                let relative = &key[prefix.len()..];
                let target = local_dir.join(relative);
                self.store.download_to(key, &target).await?;
                files += 1;
            }
        }

        info!(files, local_dir = %local_dir.display(), "downloaded report folder");
        Ok(DownloadOutcome::Completed { local_dir, files })
    }

    /// Download a set of missing folders in rate-limited batches.
    ///
    /// Folders locked by other instances are skipped, not retried; the
    /// next sync cycle picks them up if their holder failed. A store
    /// failure aborts the remainder of the run.
    pub async fn download_missing(&self, cards: &[Card]) -> SyncResult<Vec<DownloadOutcome>> {
        let mut outcomes = Vec::with_capacity(cards.len());
        for (i, batch) in cards.chunks(self.folder_batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.rate_limit_wait).await;
            }
            for card in batch {
                outcomes.push(self.download_folder(card).await?);
            }
        }
        Ok(outcomes)
    }
}
