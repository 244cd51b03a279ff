//! Sync Engine Configuration
//!
//! Loaded from environment variables with development defaults. The
//! rate-limit knobs exist to stay under the object store's
//! request-rate ceilings; the retention knob bounds the local mirror.

use std::path::PathBuf;
use std::time::Duration;

use cardbox_core::FilterQuery;

// Defaults tuned against the production bucket.
const DEFAULT_CACHE_ROOT: &str = "cardbox";
const DEFAULT_REPORTS_DIR: &str = "./test_reports";
const DEFAULT_MAX_LOCAL_DIRS: usize = 2000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 250;
const DEFAULT_FOLDER_BATCH_SIZE: usize = 5;
const DEFAULT_FILE_BATCH_SIZE: usize = 20;
const DEFAULT_LOCK_TTL_SECS: u64 = 600;

/// Configuration for the sync engine and its background tasks.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the shared key namespace (`{root}:{env}:{protocol}`, ...).
    pub cache_root: String,

    /// Local mirror root for downloaded report folders.
    pub reports_dir: PathBuf,

    /// Known environments, used to fan wildcard queries out over
    /// cache partitions.
    pub environments: Vec<String>,

    /// Known protocols, same role as `environments`.
    pub protocols: Vec<String>,

    /// Retention bound: how many mirror directories to keep.
    pub max_local_dirs: usize,

    /// How often the publisher polls the object count.
    pub poll_interval: Duration,

    /// Pause between download batches (never within a batch).
    pub rate_limit_wait: Duration,

    /// Report folders fetched per batch when downloading missing cards.
    pub folder_batch_size: usize,

    /// Objects fetched per batch within one folder download.
    pub file_batch_size: usize,

    /// TTL of dedup-lock keys; the only crash-recovery bound.
    pub lock_ttl: Duration,

    /// Pub/sub channel carrying change events.
    pub channel: String,

    /// Query the publisher refreshes on each detected change.
    pub publisher_query: FilterQuery,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_root: DEFAULT_CACHE_ROOT.to_string(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            environments: ["qa", "dev", "uat", "sit"]
                .map(str::to_string)
                .to_vec(),
            protocols: ["api", "ui", "unit", "perf", "db", "fix"]
                .map(str::to_string)
                .to_vec(),
            max_local_dirs: DEFAULT_MAX_LOCAL_DIRS,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            rate_limit_wait: Duration::from_millis(DEFAULT_RATE_LIMIT_WAIT_MS),
            folder_batch_size: DEFAULT_FOLDER_BATCH_SIZE,
            file_batch_size: DEFAULT_FILE_BATCH_SIZE,
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            channel: format!("{DEFAULT_CACHE_ROOT}:notifications"),
            publisher_query: FilterQuery::default(),
        }
    }
}

impl SyncConfig {
    /// Create SyncConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CARDBOX_CACHE_ROOT`: key namespace root (default: "cardbox")
    /// - `CARDBOX_REPORTS_DIR`: local mirror root (default: "./test_reports")
    /// - `CARDBOX_ENVIRONMENTS`: comma-separated environment list
    /// - `CARDBOX_PROTOCOLS`: comma-separated protocol list
    /// - `CARDBOX_MAX_LOCAL_DIRS`: mirror retention count (default: 2000)
    /// - `CARDBOX_POLL_INTERVAL_SECS`: publisher poll interval (default: 10)
    /// - `CARDBOX_RATE_LIMIT_WAIT_MS`: inter-batch pause (default: 250)
    /// - `CARDBOX_FOLDER_BATCH_SIZE`: folders per batch (default: 5)
    /// - `CARDBOX_FILE_BATCH_SIZE`: files per batch (default: 20)
    /// - `CARDBOX_LOCK_TTL_SECS`: dedup-lock TTL (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_root =
            std::env::var("CARDBOX_CACHE_ROOT").unwrap_or(defaults.cache_root);

        let reports_dir = std::env::var("CARDBOX_REPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.reports_dir);

        let environments = std::env::var("CARDBOX_ENVIRONMENTS")
            .ok()
            .map(|s| split_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.environments);

        let protocols = std::env::var("CARDBOX_PROTOCOLS")
            .ok()
            .map(|s| split_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.protocols);

        let max_local_dirs = std::env::var("CARDBOX_MAX_LOCAL_DIRS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_local_dirs);

        let poll_interval = std::env::var("CARDBOX_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let rate_limit_wait = std::env::var("CARDBOX_RATE_LIMIT_WAIT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.rate_limit_wait);

        let folder_batch_size = std::env::var("CARDBOX_FOLDER_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.folder_batch_size);

        let file_batch_size = std::env::var("CARDBOX_FILE_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.file_batch_size);

        let lock_ttl = std::env::var("CARDBOX_LOCK_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.lock_ttl);

        let channel = format!("{cache_root}:notifications");

        Self {
            cache_root,
            reports_dir,
            environments,
            protocols,
            max_local_dirs,
            poll_interval,
            rate_limit_wait,
            folder_batch_size,
            file_batch_size,
            lock_ttl,
            channel,
            publisher_query: defaults.publisher_query,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
