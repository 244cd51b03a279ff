//! Per-client SSE streaming.
//!
//! Each connected viewer gets one [`Streamer::run`] invocation: it
//! registers the client, emits a `connected` frame, then forwards
//! pub/sub notifications as SSE data frames until the client
//! disconnects, the subscription ends, or shutdown is signalled.
//! Registration bookkeeping runs on every exit path.
//!
//! Client counters live in the shared key-value store, not process
//! memory, so the numbers stay correct across instances and restarts.

use std::sync::Arc;

use cardbox_store::{
    KeySpace, KeyValueStore, PubSub, STAT_ACTIVE_CLIENTS, STAT_LIFETIME_CLIENTS,
    STAT_MAX_CONCURRENT_CLIENTS,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::SyncResult;

/// A fresh client identifier. Time-ordered so log lines sort by
/// connection time.
pub fn new_client_id() -> String {
    Uuid::now_v7().to_string()
}

// ============================================================================
// SSE FRAMES
// ============================================================================

/// One server-sent-events frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Optional event name (`event:` line).
    pub event: Option<String>,
    /// JSON payload (`data:` line).
    pub data: String,
}

impl SseFrame {
    /// The handshake frame sent once per connection.
    pub fn connected(client_id: &str, active_clients: i64) -> Self {
        Self {
            event: Some("connected".to_string()),
            data: serde_json::json!({
                "client_id": client_id,
                "active_clients": active_clients,
            })
            .to_string(),
        }
    }

    /// A plain data frame carrying a notification payload.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }
}

impl std::fmt::Display for SseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(event) = &self.event {
            writeln!(f, "event: {event}")?;
        }
        writeln!(f, "data: {}", self.data)?;
        writeln!(f)
    }
}

// ============================================================================
// CLIENT REGISTRY
// ============================================================================

/// Point-in-time view of the client counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMetricsSnapshot {
    pub active: i64,
    pub lifetime: i64,
    pub max_concurrent: i64,
}

/// Client counters backed by the shared key-value store.
#[derive(Clone)]
pub struct ClientRegistry {
    kv: Arc<dyn KeyValueStore>,
    keys: KeySpace,
}

impl ClientRegistry {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self { kv, keys }
    }

    /// Record a new connection. Returns the active count including it.
    pub async fn register(&self, client_id: &str) -> SyncResult<i64> {
        let active = self
            .kv
            .increment(&self.keys.stat(STAT_ACTIVE_CLIENTS), 1)
            .await?;
        self.kv
            .increment(&self.keys.stat(STAT_LIFETIME_CLIENTS), 1)
            .await?;

        let max_key = self.keys.stat(STAT_MAX_CONCURRENT_CLIENTS);
        let max = self
            .kv
            .get(&max_key)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if active > max {
            self.kv.set(&max_key, &active.to_string()).await?;
        }

        info!(client_id, active, "client connected");
        Ok(active)
    }

    /// Record a disconnection.
    pub async fn unregister(&self, client_id: &str) -> SyncResult<()> {
        let active = self
            .kv
            .decrement(&self.keys.stat(STAT_ACTIVE_CLIENTS), 1)
            .await?;
        info!(client_id, active, "client disconnected");
        Ok(())
    }

    /// Zero every counter. Used by operators after maintenance windows.
    pub async fn reset(&self) -> SyncResult<()> {
        for name in [
            STAT_ACTIVE_CLIENTS,
            STAT_LIFETIME_CLIENTS,
            STAT_MAX_CONCURRENT_CLIENTS,
        ] {
            self.kv.set(&self.keys.stat(name), "0").await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> SyncResult<ClientMetricsSnapshot> {
        Ok(ClientMetricsSnapshot {
            active: self.read_counter(STAT_ACTIVE_CLIENTS).await?,
            lifetime: self.read_counter(STAT_LIFETIME_CLIENTS).await?,
            max_concurrent: self.read_counter(STAT_MAX_CONCURRENT_CLIENTS).await?,
        })
    }

    async fn read_counter(&self, name: &str) -> SyncResult<i64> {
        Ok(self
            .kv
            .get(&self.keys.stat(name))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

// ============================================================================
// STREAMER
// ============================================================================

/// Forwards change notifications to one connected client.
#[derive(Clone)]
pub struct Streamer {
    pubsub: Arc<dyn PubSub>,
    registry: ClientRegistry,
    channel: String,
}

impl Streamer {
    pub fn new(pubsub: Arc<dyn PubSub>, registry: ClientRegistry, channel: String) -> Self {
        Self {
            pubsub,
            registry,
            channel,
        }
    }

    /// Serve one client until it disconnects or shutdown is signalled.
    ///
    /// Frames go out through `tx`; the caller owns the transport. The
    /// receiver side being dropped counts as a disconnect.
    #[instrument(skip(self, tx, shutdown))]
    pub async fn run(
        &self,
        client_id: &str,
        tx: mpsc::Sender<SseFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SyncResult<()> {
        // Subscribe before registering so no notification published
        // after the handshake can be missed.
        let mut subscription = self.pubsub.subscribe(&self.channel).await?;
        let active = self.registry.register(client_id).await?;

        if tx.send(SseFrame::connected(client_id, active)).await.is_err() {
            debug!(client_id, "client gone before handshake");
            return self.registry.unregister(client_id).await;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!(client_id, "client disconnected");
                    break;
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        debug!(client_id, "stream shutting down");
                        break;
                    }
                }
                message = subscription.recv() => {
                    let Some(payload) = message else {
                        warn!(client_id, "notification channel closed");
                        break;
                    };
                    if tx.send(SseFrame::message(payload)).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.registry.unregister(client_id).await
    }

    /// Serve one client as a `Stream` of frames.
    ///
    /// Spawns [`Streamer::run`] on a buffered channel and hands the
    /// receiving side to the transport layer. Dropping the stream
    /// disconnects the client.
    pub fn frames(
        &self,
        client_id: String,
        shutdown: watch::Receiver<bool>,
    ) -> ReceiverStream<SseFrame> {
        let (tx, rx) = mpsc::channel(16);
        let streamer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = streamer.run(&client_id, tx, shutdown).await {
                warn!(client_id = %client_id, error = %e, "stream ended with error");
            }
        });
        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardbox_store::{InMemoryKeyValueStore, InMemoryPubSub};

    fn registry() -> ClientRegistry {
        ClientRegistry::new(
            Arc::new(InMemoryKeyValueStore::new()),
            KeySpace::new("cardbox"),
        )
    }

    struct Fixture {
        pubsub: Arc<InMemoryPubSub>,
        streamer: Streamer,
        registry: ClientRegistry,
    }

    fn fixture() -> Fixture {
        let pubsub = Arc::new(InMemoryPubSub::new());
        let registry = registry();
        let streamer = Streamer::new(
            Arc::clone(&pubsub) as Arc<dyn PubSub>,
            registry.clone(),
            "cardbox:notifications".to_string(),
        );
        Fixture {
            pubsub,
            streamer,
            registry,
        }
    }

    #[test]
    fn connected_frame_has_event_and_data_lines() {
        let frame = SseFrame::connected("abc", 3);
        let rendered = frame.to_string();
        assert!(rendered.starts_with("event: connected\ndata: {"));
        assert!(rendered.ends_with("}\n\n"));
        assert!(rendered.contains("\"client_id\":\"abc\""));
    }

    #[test]
    fn message_frame_has_no_event_line() {
        let frame = SseFrame::message("{\"type\":\"new_cards\"}");
        assert_eq!(frame.to_string(), "data: {\"type\":\"new_cards\"}\n\n");
    }

    #[test]
    fn client_ids_are_unique() {
        assert_ne!(new_client_id(), new_client_id());
    }

    #[tokio::test]
    async fn register_tracks_active_lifetime_and_peak() {
        let registry = registry();
        registry.register("a").await.expect("register");
        registry.register("b").await.expect("register");
        registry.unregister("a").await.expect("unregister");
        registry.register("c").await.expect("register");

        let snapshot = registry.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.active, 2);
        assert_eq!(snapshot.lifetime, 3);
        assert_eq!(snapshot.max_concurrent, 2);
    }

    #[tokio::test]
    async fn reset_zeroes_every_counter() {
        let registry = registry();
        registry.register("a").await.expect("register");
        registry.reset().await.expect("reset");

        let snapshot = registry.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.lifetime, 0);
        assert_eq!(snapshot.max_concurrent, 0);
    }

    #[tokio::test]
    async fn stream_sends_handshake_then_forwards_notifications() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(8);
        let (_stop, shutdown) = watch::channel(false);

        let streamer = f.streamer.clone();
        let handle =
            tokio::spawn(async move { streamer.run("client-1", tx, shutdown).await });

        let handshake = rx.recv().await.expect("handshake");
        assert_eq!(handshake.event.as_deref(), Some("connected"));

        f.pubsub
            .publish("cardbox:notifications", "{\"type\":\"new_cards\"}")
            .await
            .expect("publish");
        let frame = rx.recv().await.expect("frame");
        assert_eq!(frame.event, None);
        assert_eq!(frame.data, "{\"type\":\"new_cards\"}");

        drop(rx);
        handle.await.expect("join").expect("run");
        let snapshot = f.registry.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.active, 0);
    }

    #[tokio::test]
    async fn shutdown_unregisters_the_client() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(8);
        let (stop, shutdown) = watch::channel(false);

        let streamer = f.streamer.clone();
        let handle =
            tokio::spawn(async move { streamer.run("client-1", tx, shutdown).await });
        rx.recv().await.expect("handshake");
        assert_eq!(f.registry.snapshot().await.expect("snapshot").active, 1);

        stop.send(true).expect("signal");
        handle.await.expect("join").expect("run");
        assert_eq!(f.registry.snapshot().await.expect("snapshot").active, 0);
    }

    #[tokio::test]
    async fn frames_surface_works_as_a_stream() {
        use tokio_stream::StreamExt;

        let f = fixture();
        let (stop, shutdown) = watch::channel(false);
        let mut stream = f.streamer.frames(new_client_id(), shutdown);

        let handshake = stream.next().await.expect("handshake");
        assert_eq!(handshake.event.as_deref(), Some("connected"));

        f.pubsub
            .publish("cardbox:notifications", "{\"n\":1}")
            .await
            .expect("publish");
        let frame = stream.next().await.expect("frame");
        assert_eq!(frame.data, "{\"n\":1}");

        stop.send(true).expect("signal");
        assert_eq!(stream.next().await, None);
        // Bookkeeping ran on the way out.
        tokio::task::yield_now().await;
        assert_eq!(f.registry.snapshot().await.expect("snapshot").active, 0);
    }

    #[tokio::test]
    async fn other_channels_do_not_reach_the_client() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(8);
        let (stop, shutdown) = watch::channel(false);

        let streamer = f.streamer.clone();
        let handle =
            tokio::spawn(async move { streamer.run("client-1", tx, shutdown).await });
        rx.recv().await.expect("handshake");

        f.pubsub
            .publish("other:channel", "{}")
            .await
            .expect("publish");
        f.pubsub
            .publish("cardbox:notifications", "{\"n\":1}")
            .await
            .expect("publish");
        let frame = rx.recv().await.expect("frame");
        assert_eq!(frame.data, "{\"n\":1}");

        stop.send(true).expect("signal");
        handle.await.expect("join").expect("run");
    }
}
