//! Pub/sub trait and in-memory implementation.
//!
//! A single channel carries JSON-encoded change events from the
//! notification publisher to every connected streamer. Subscriptions
//! are pull-based: `recv` waits for the next message and returns
//! `None` only when the hub side has gone away.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// A live subscription to one channel.
///
/// Awaiting `recv` distinguishes "no message yet" (the future stays
/// pending) from "channel closed" (`None`).
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self { rx }
    }

    /// Wait for the next published message.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Async publish/subscribe operations.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a message, returning the number of subscribers reached.
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-memory pub/sub hub for tests and single-node development.
#[derive(Debug, Default)]
pub struct InMemoryPubSub {
    channels: DashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize> {
        let mut delivered = 0;
        if let Some(mut senders) = self.channels.get_mut(channel) {
            // Dropped subscribers are pruned as their sends fail.
            senders.retain(|tx| {
                let ok = tx.send(message.to_string()).is_ok();
                if ok {
                    delivered += 1;
                }
                ok
            });
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(Subscription::new(rx))
    }
}
