//! End-to-end cycle: a CI job uploads a report folder, the publisher
//! detects the growth, reconciles the cache, mirrors the folder
//! locally, and a connected client receives the change event.

use std::sync::Arc;
use std::time::Duration;

use cardbox_core::{FetchSource, FilterQuery};
use cardbox_store::{
    InMemoryKeyValueStore, InMemoryObjectStore, InMemoryPubSub, KeyValueStore, ObjectStore, PubSub,
};
use cardbox_sync::{
    new_client_id, notification_publisher_task, PublisherMetrics, Streamer, SyncConfig,
    SyncEngine, TaskRegistry,
};
use chrono::Utc;
use tokio::sync::mpsc;

fn recent_day() -> String {
    Utc::now().format("%m-%d-%Y_%I-%M-%S_%p").to_string()
}

fn upload_run(store: &InMemoryObjectStore, day: &str) {
    let root = format!("ci/test_reports/loan/qa/api/{day}");
    let report = serde_json::json!({
        "config": {"workers": 2},
        "suites": [{"title": "checkout"}],
        "stats": {
            "startTime": Utc::now().to_rfc3339(),
            "expected": 12,
            "unexpected": 1,
            "skipped": 2,
            "duration": 4321.0
        }
    });
    store.put(&format!("{root}/report.json"), report.to_string().into_bytes());
    store.put(&format!("{root}/index.html"), b"<html>report</html>".to_vec());
    store.put(&format!("{root}/data/trace.zip"), b"zip".to_vec());
}

#[tokio::test(start_paused = true)]
async fn upload_flows_to_cache_mirror_and_client() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = SyncConfig::default();
    config.reports_dir = dir.path().to_path_buf();
    config.rate_limit_wait = Duration::ZERO;
    config.poll_interval = Duration::from_secs(10);

    let store = Arc::new(InMemoryObjectStore::new());
    let pubsub = Arc::new(InMemoryPubSub::new());
    let engine = Arc::new(SyncEngine::new(
        config,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::new(InMemoryKeyValueStore::new()) as Arc<dyn KeyValueStore>,
        Arc::clone(&pubsub) as Arc<dyn PubSub>,
    ));
    let registry = TaskRegistry::new();
    let metrics = Arc::new(PublisherMetrics::new());

    // Background publisher.
    {
        let engine = Arc::clone(&engine);
        let metrics = Arc::clone(&metrics);
        assert!(registry.spawn("publisher", move |shutdown| {
            notification_publisher_task(engine, metrics, shutdown)
        }));
    }

    // One connected client.
    let client_id = new_client_id();
    let (tx, mut rx) = mpsc::channel(8);
    {
        let streamer = Streamer::new(
            Arc::clone(&pubsub) as Arc<dyn PubSub>,
            engine.registry().clone(),
            engine.config().channel.clone(),
        );
        let client_id = client_id.clone();
        assert!(registry.spawn("streamer", move |shutdown| async move {
            if let Err(e) = streamer.run(&client_id, tx, shutdown).await {
                panic!("streamer failed: {e}");
            }
        }));
    }

    let handshake = rx.recv().await.expect("handshake");
    assert_eq!(handshake.event.as_deref(), Some("connected"));
    assert_eq!(engine.registry().snapshot().await.expect("snapshot").active, 1);

    // Baseline cycle sees an empty bucket.
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A CI job uploads a fresh run.
    let day = recent_day();
    upload_run(&store, &day);

    // The client hears about it.
    let frame = rx.recv().await.expect("change frame");
    assert_eq!(frame.event, None);
    let event: serde_json::Value = serde_json::from_str(&frame.data).expect("json");
    assert_eq!(event["type"], "new_cards");
    assert_eq!(event["count"], 3);
    let rendered = frame.to_string();
    assert!(rendered.starts_with("data: {"));
    assert!(rendered.ends_with("\n\n"));

    // The cache holds the normalized card.
    let query = FilterQuery::any(1, FetchSource::Local);
    let cards = engine.cards(&query).await.expect("cards");
    assert_eq!(cards.len(), 1);
    let card = &cards[0];
    assert_eq!(card.card_date(), day);
    assert_eq!(card.html_report, format!("{day}/index.html"));
    assert!(card.report.get("suites").is_none());
    assert_eq!(card.report["stats"]["runner"], "playwright");
    assert_eq!(card.report["stats"]["expected"], 12);

    // The mirror holds the whole folder.
    let local = dir.path().join(&day);
    assert!(local.join("report.json").is_file());
    assert!(local.join("index.html").is_file());
    assert!(local.join("data/trace.zip").is_file());
    assert!(engine.missing(&query).await.expect("missing").is_empty());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.changes_detected, 1);
    assert_eq!(snapshot.cards_cached, 1);
    assert_eq!(snapshot.folders_downloaded, 1);
    assert_eq!(snapshot.errors, 0);

    // Cooperative shutdown unwinds client bookkeeping.
    registry.stop_all().await;
    assert_eq!(engine.registry().snapshot().await.expect("snapshot").active, 0);
}

#[tokio::test(start_paused = true)]
async fn second_instance_sees_the_same_cache_without_refetching() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let dir_b = tempfile::tempdir().expect("tempdir");

    let store = Arc::new(InMemoryObjectStore::new());
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let pubsub = Arc::new(InMemoryPubSub::new());

    let engine_for = |reports_dir: &std::path::Path| {
        let mut config = SyncConfig::default();
        config.reports_dir = reports_dir.to_path_buf();
        config.rate_limit_wait = Duration::ZERO;
        SyncEngine::new(
            config,
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::clone(&kv) as Arc<dyn KeyValueStore>,
            Arc::clone(&pubsub) as Arc<dyn PubSub>,
        )
    };
    let instance_a = engine_for(dir_a.path());
    let instance_b = engine_for(dir_b.path());

    let day = recent_day();
    upload_run(&store, &day);

    let query = FilterQuery::any(1, FetchSource::Remote);
    assert_eq!(instance_a.refresh_cache(&query).await.expect("refresh"), 1);
    // The card is already cached; instance B creates nothing new.
    assert_eq!(instance_b.refresh_cache(&query).await.expect("refresh"), 0);

    // Both instances read the same card and mirror it independently.
    let cards = instance_b
        .cards(&FilterQuery::any(1, FetchSource::Local))
        .await
        .expect("cards");
    assert_eq!(cards.len(), 1);

    let report = instance_a.sync_local(&query).await.expect("sync");
    assert_eq!(report.downloaded, 1);
    let report = instance_b.sync_local(&query).await.expect("sync");
    assert_eq!(report.downloaded, 1);
    assert!(dir_a.path().join(&day).join("report.json").is_file());
    assert!(dir_b.path().join(&day).join("report.json").is_file());
}
