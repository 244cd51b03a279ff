//! Local mirror manager.
//!
//! The mirror is a directory of report folders named by card date,
//! one folder per run. Two jobs live here: gap detection (which cached
//! cards have no local folder yet) and retention pruning (delete the
//! oldest folders once the mirror exceeds its configured bound).
//!
//! Pruning keeps going past individual failures. A folder that cannot
//! be removed is counted and logged, and the sweep moves on; it will
//! be retried on the next cycle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cardbox_core::{parse_card_date, Card};
use tracing::{debug, instrument, warn};

use crate::error::{SyncError, SyncResult};

/// How a cleanup sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Every candidate folder was removed (possibly zero).
    Clean,
    /// At least one folder could not be removed.
    PartialFailure,
    /// The mirror root does not exist yet; nothing to prune.
    MissingRoot,
}

/// Result of one retention sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub outcome: CleanupOutcome,
    /// Folders removed this sweep.
    pub removed: usize,
    /// Folders that failed to remove.
    pub failed: usize,
}

/// Manages the local report mirror.
#[derive(Debug, Clone)]
pub struct MirrorManager {
    reports_dir: PathBuf,
    max_local_dirs: usize,
}

impl MirrorManager {
    pub fn new(reports_dir: impl Into<PathBuf>, max_local_dirs: usize) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            max_local_dirs,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Card dates present in the mirror.
    ///
    /// A missing mirror root reads as empty; it is created lazily by
    /// the first download.
    pub async fn local_card_dates(&self) -> SyncResult<HashSet<String>> {
        let mut dates = HashSet::new();
        let mut entries = match tokio::fs::read_dir(&self.reports_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dates),
            Err(e) => return Err(SyncError::io(self.reports_dir.display().to_string(), &e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(self.reports_dir.display().to_string(), &e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| SyncError::io(entry.path().display().to_string(), &e))?
                .is_dir();
            if is_dir {
                dates.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(dates)
    }

    /// Cached cards with no mirror folder yet, in input order.
    pub async fn missing(&self, cached: &[Card]) -> SyncResult<Vec<Card>> {
        let local = self.local_card_dates().await?;
        let missing: Vec<Card> = cached
            .iter()
            .filter(|card| !local.contains(card.card_date()))
            .cloned()
            .collect();
        debug!(
            cached = cached.len(),
            local = local.len(),
            missing = missing.len(),
            "computed mirror gap"
        );
        Ok(missing)
    }

    /// Prune the oldest folders beyond the retention bound.
    ///
    /// Folders are ranked by creation time (falling back to mtime
    /// where the filesystem has no birth time), with the parsed
    /// card-date name as tiebreaker. A backfilled old run is the
    /// newest folder on disk and must survive the sweep.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> SyncResult<CleanupReport> {
        let mut folders = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.reports_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CleanupReport {
                    outcome: CleanupOutcome::MissingRoot,
                    removed: 0,
                    failed: 0,
                });
            }
            Err(e) => return Err(SyncError::io(self.reports_dir.display().to_string(), &e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(self.reports_dir.display().to_string(), &e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| SyncError::io(entry.path().display().to_string(), &e))?;
            if metadata.is_dir() {
                let created = metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                let name = entry.file_name().to_string_lossy().into_owned();
                folders.push((created, parse_card_date(&name).ok(), entry.path()));
            }
        }

        if folders.len() <= self.max_local_dirs {
            return Ok(CleanupReport {
                outcome: CleanupOutcome::Clean,
                removed: 0,
                failed: 0,
            });
        }

        // Most recently created first; name breaks creation-time ties.
        folders.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        let mut removed = 0;
        let mut failed = 0;
        for (_, _, path) in folders.drain(self.max_local_dirs..) {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to prune mirror folder");
                    failed += 1;
                }
            }
        }

        let outcome = if failed == 0 {
            CleanupOutcome::Clean
        } else {
            CleanupOutcome::PartialFailure
        };
        debug!(removed, failed, "pruned mirror");
        Ok(CleanupReport {
            outcome,
            removed,
            failed,
        })
    }
}
