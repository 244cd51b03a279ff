//! Notification publisher.
//!
//! A periodic loop that watches the object store's raw object count
//! and, when it grows, refreshes the cache, synchronizes the local
//! mirror, and publishes a change event for the streamers to fan out.
//!
//! The baseline only moves forward on a fully successful cycle, so a
//! failed refresh is retried on the next tick instead of losing the
//! change. A shrinking count (bucket cleanup) rebases silently; fewer
//! objects never means new cards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::error::SyncResult;

/// A change event published to the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The object store grew; new cards may be available.
    NewCards {
        /// Objects added since the last baseline.
        count: usize,
        /// Current raw object count.
        total: usize,
        /// Previous baseline.
        previous: usize,
        /// When the change was detected (RFC 3339).
        timestamp: String,
    },
}

impl ChangeEvent {
    pub fn new_cards(count: usize, total: usize, previous: usize) -> Self {
        ChangeEvent::NewCards {
            count,
            total,
            previous,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Wire form published on the channel.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Point-in-time view of the publisher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherMetricsSnapshot {
    pub cycles: u64,
    pub changes_detected: u64,
    pub cards_cached: u64,
    pub folders_downloaded: u64,
    pub errors: u64,
}

/// Counters for the publisher loop.
#[derive(Debug, Default)]
pub struct PublisherMetrics {
    cycles: AtomicU64,
    changes_detected: AtomicU64,
    cards_cached: AtomicU64,
    folders_downloaded: AtomicU64,
    errors: AtomicU64,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn record_change(&self, cards_cached: usize, folders_downloaded: usize) {
        self.changes_detected.fetch_add(1, Ordering::Relaxed);
        self.cards_cached
            .fetch_add(cards_cached as u64, Ordering::Relaxed);
        self.folders_downloaded
            .fetch_add(folders_downloaded as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PublisherMetricsSnapshot {
        PublisherMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            changes_detected: self.changes_detected.load(Ordering::Relaxed),
            cards_cached: self.cards_cached.load(Ordering::Relaxed),
            folders_downloaded: self.folders_downloaded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// PUBLISHER TASK
// ============================================================================

/// Periodic change-detection and notification loop.
///
/// Runs until `shutdown` flips to true or its sender drops. Spawn it
/// through [`crate::tasks::TaskRegistry`] so shutdown is awaited.
pub async fn notification_publisher_task(
    engine: Arc<SyncEngine>,
    metrics: Arc<PublisherMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(engine.config().poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut baseline: Option<usize> = None;

    info!(
        poll_interval = ?engine.config().poll_interval,
        channel = %engine.config().channel,
        "notification publisher started"
    );

    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    info!("notification publisher stopping");
                    break;
                }
            }
            _ = interval.tick() => {
                metrics.record_cycle();
                let total = match engine.total_objects().await {
                    Ok(total) => total,
                    Err(e) => {
                        warn!(error = %e, "object count failed");
                        metrics.record_error();
                        continue;
                    }
                };

                match baseline {
                    None => {
                        debug!(total, "established object-count baseline");
                        baseline = Some(total);
                    }
                    Some(previous) if total > previous => {
                        match publish_cycle(&engine, &metrics, total, previous).await {
                            Ok(true) => baseline = Some(total),
                            // Another instance is reloading; it will
                            // publish. Baseline stays put so a failure
                            // over there is retried here.
                            Ok(false) => {}
                            Err(e) => {
                                warn!(error = %e, "change cycle failed");
                                metrics.record_error();
                            }
                        }
                    }
                    Some(previous) if total < previous => {
                        debug!(total, previous, "object count shrank, rebasing");
                        baseline = Some(total);
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

async fn publish_cycle(
    engine: &SyncEngine,
    metrics: &PublisherMetrics,
    total: usize,
    previous: usize,
) -> SyncResult<bool> {
    let query = engine.config().publisher_query.clone();
    let Some((created, report)) = engine.try_reload(&query).await? else {
        return Ok(false);
    };
    metrics.record_change(created, report.downloaded);

    let event = ChangeEvent::new_cards(total - previous, total, previous);
    let delivered = engine.publish_change(&event).await?;
    info!(
        count = total - previous,
        created,
        downloaded = report.downloaded,
        delivered,
        "published change event"
    );
    Ok(true)
}
