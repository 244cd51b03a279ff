//! Cardbox Sync - Cache Reconciliation and Synchronization Engine
//!
//! Aggregates test-run artifact bundles ("cards") produced by CI jobs
//! into a shared cache with live change notifications:
//!
//! - [`scanner`] lists and parses object-store keys into card metadata
//! - [`reconciler`] populates the shared cache with at-most-once
//!   create-if-absent semantics
//! - [`mirror`] diffs cache contents against the local report mirror
//!   and prunes stale directories
//! - [`downloader`] fetches missing report folders in rate-limited
//!   batches under the cross-process dedup lock
//! - [`notify`] runs the periodic publisher loop and fans change
//!   events out to per-client SSE streamers
//!
//! The HTTP/WebSocket surfaces are external collaborators: this crate
//! exposes engine operations and streams, not routes.

pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod notify;
pub mod reconciler;
pub mod scanner;
pub mod streamer;
pub mod tasks;
pub mod telemetry;

pub use config::SyncConfig;
pub use downloader::{BatchDownloader, DownloadOutcome};
pub use engine::{LocalSyncReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use mirror::{CleanupOutcome, CleanupReport, MirrorManager};
pub use notify::{
    notification_publisher_task, ChangeEvent, PublisherMetrics, PublisherMetricsSnapshot,
};
pub use reconciler::CacheReconciler;
pub use scanner::RemoteScanner;
pub use streamer::{new_client_id, ClientMetricsSnapshot, ClientRegistry, SseFrame, Streamer};
pub use tasks::TaskRegistry;
pub use telemetry::init_tracing;
