//! Sync engine: the facade over scanner, reconciler, mirror, and
//! downloader.
//!
//! Callers (HTTP handlers, the notification publisher) talk to the
//! engine; the engine owns the collaborators and the partition fan-out
//! that turns wildcard queries into concrete cache keys.

use std::sync::Arc;

use cardbox_core::{Card, FetchSource, FilterQuery, MatchField};
use cardbox_store::{
    DownloadQueue, KeySpace, KeyValueStore, ObjectStore, PubSub, OPERATION_RELOAD,
};
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::downloader::{BatchDownloader, DownloadOutcome};
use crate::error::SyncResult;
use crate::mirror::{CleanupReport, MirrorManager};
use crate::notify::ChangeEvent;
use crate::reconciler::CacheReconciler;
use crate::scanner::RemoteScanner;
use crate::streamer::ClientRegistry;

/// Result of one local synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSyncReport {
    /// Cards matching the query in the shared cache.
    pub cached: usize,
    /// Cards with no mirror folder before this pass.
    pub missing: usize,
    /// Folders this pass downloaded.
    pub downloaded: usize,
    /// Folders skipped because another instance held their lock.
    pub in_progress: usize,
    /// Retention sweep that followed the downloads.
    pub cleanup: CleanupReport,
}

/// Owns the sync collaborators and exposes the engine operations.
#[derive(Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    scanner: RemoteScanner,
    reconciler: CacheReconciler,
    mirror: MirrorManager,
    downloader: BatchDownloader,
    queue: DownloadQueue,
    pubsub: Arc<dyn PubSub>,
    registry: ClientRegistry,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<dyn KeyValueStore>,
        pubsub: Arc<dyn PubSub>,
    ) -> Self {
        let keys = KeySpace::new(&config.cache_root);
        let queue = DownloadQueue::new(Arc::clone(&kv), keys.clone(), config.lock_ttl);
        Self {
            scanner: RemoteScanner::new(Arc::clone(&object_store)),
            reconciler: CacheReconciler::new(
                Arc::clone(&object_store),
                Arc::clone(&kv),
                keys.clone(),
            ),
            mirror: MirrorManager::new(&config.reports_dir, config.max_local_dirs),
            downloader: BatchDownloader::new(object_store, queue.clone(), &config),
            queue,
            registry: ClientRegistry::new(kv, keys),
            pubsub,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Cache partitions a query fans out over.
    ///
    /// Exact fields pin one value; wildcards expand over the configured
    /// lists. The cross product is the set of hashes to read.
    pub fn partitions(&self, query: &FilterQuery) -> Vec<(String, String)> {
        let environments: Vec<&str> = match &query.environment {
            MatchField::Exact(value) => vec![value.as_str()],
            MatchField::Any => self.config.environments.iter().map(String::as_str).collect(),
        };
        let protocols: Vec<&str> = match &query.protocol {
            MatchField::Exact(value) => vec![value.as_str()],
            MatchField::Any => self.config.protocols.iter().map(String::as_str).collect(),
        };
        environments
            .iter()
            .flat_map(|env| {
                protocols
                    .iter()
                    .map(move |protocol| (env.to_string(), protocol.to_string()))
            })
            .collect()
    }

    /// Scan the store and reconcile matching cards into the cache.
    ///
    /// Returns how many cache entries this call created.
    #[instrument(skip(self, query))]
    pub async fn refresh_cache(&self, query: &FilterQuery) -> SyncResult<usize> {
        let scanned = self.scanner.scan_matching(query).await?;
        let created = self.reconciler.refresh(&scanned).await?;
        if created > 0 {
            info!(scanned = scanned.len(), created, "cache refreshed");
        }
        Ok(created)
    }

    /// Cards matching a query, newest first.
    ///
    /// A remote-sourced query refreshes the cache before reading;
    /// a local-sourced query reads the cache as-is.
    pub async fn cards(&self, query: &FilterQuery) -> SyncResult<Vec<Card>> {
        if query.source == FetchSource::Remote {
            self.refresh_cache(query).await?;
        }
        self.reconciler
            .cached_cards(&self.partitions(query), query)
            .await
    }

    /// Cached cards with no local mirror folder.
    pub async fn missing(&self, query: &FilterQuery) -> SyncResult<Vec<Card>> {
        let cached = self
            .reconciler
            .cached_cards(&self.partitions(query), query)
            .await?;
        self.mirror.missing(&cached).await
    }

    /// Bring the local mirror up to date with the cache.
    ///
    /// Downloads every missing folder, then runs the retention sweep.
    #[instrument(skip(self, query))]
    pub async fn sync_local(&self, query: &FilterQuery) -> SyncResult<LocalSyncReport> {
        let cached = self
            .reconciler
            .cached_cards(&self.partitions(query), query)
            .await?;
        let missing = self.mirror.missing(&cached).await?;
        let outcomes = self.downloader.download_missing(&missing).await?;

        let downloaded = outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Completed { .. }))
            .count();
        let in_progress = outcomes.len() - downloaded;
        let cleanup = self.mirror.cleanup().await?;

        Ok(LocalSyncReport {
            cached: cached.len(),
            missing: missing.len(),
            downloaded,
            in_progress,
            cleanup,
        })
    }

    /// Run one full reload (refresh + local sync) under the reload
    /// lock.
    ///
    /// Returns `None` without doing anything when another instance
    /// holds the lock; that instance is already doing this work.
    #[instrument(skip(self, query))]
    pub async fn try_reload(
        &self,
        query: &FilterQuery,
    ) -> SyncResult<Option<(usize, LocalSyncReport)>> {
        if !self.queue.acquire(OPERATION_RELOAD, "cache", None).await? {
            debug!("reload already in progress elsewhere");
            return Ok(None);
        }

        let result = async {
            let created = self.refresh_cache(query).await?;
            let report = self.sync_local(query).await?;
            Ok((created, report))
        }
        .await;

        if let Err(e) = self.queue.release(OPERATION_RELOAD, "cache").await {
            warn!(error = %e, "failed to release reload lock");
        }
        result.map(Some)
    }

    /// Raw object count used for change detection.
    pub async fn total_objects(&self) -> SyncResult<usize> {
        self.scanner.total_objects().await
    }

    /// Publish a change event, returning how many subscribers saw it.
    pub async fn publish_change(&self, event: &ChangeEvent) -> SyncResult<usize> {
        let payload = event.to_json();
        Ok(self.pubsub.publish(&self.config.channel, &payload).await?)
    }
}
