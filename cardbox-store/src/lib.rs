//! Cardbox Store - Collaborator Traits and In-Memory Backends
//!
//! Abstracts the three external stores the sync engine coordinates
//! through: an object store (report folders), a shared key-value store
//! (card cache, dedup locks, client metrics), and a pub/sub channel
//! (change notifications). Each trait ships with an in-memory
//! implementation for tests and single-node development.
//!
//! The key-value store is the only cross-process coordination
//! primitive in the system: the download queue's conditional create
//! and the card cache's conditional hash set both ride on it.

pub mod error;
pub mod keys;
pub mod kv;
pub mod object;
pub mod pubsub;
pub mod queue;

pub use error::{StoreError, StoreResult};
pub use keys::{
    KeySpace, STAT_ACTIVE_CLIENTS, STAT_LIFETIME_CLIENTS, STAT_MAX_CONCURRENT_CLIENTS,
};
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use object::{InMemoryObjectStore, ObjectMeta, ObjectStore};
pub use pubsub::{InMemoryPubSub, PubSub, Subscription};
pub use queue::{DownloadQueue, OPERATION_DOWNLOAD, OPERATION_RELOAD};
