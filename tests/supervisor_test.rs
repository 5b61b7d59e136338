mod common;

use binlog_relay::reader::{ConnectionSupervisor, ReaderOptions, ReaderSignal, ReaderStream};
use binlog_relay::subscription::{SubscriptionRegistry, TableFilter};
use common::{insert_event, position, ScriptedSource};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn options(retry_ms: u64) -> ReaderOptions {
    ReaderOptions {
        retry_delay: Duration::from_millis(retry_ms),
        ..Default::default()
    }
}

fn registry() -> Arc<Mutex<SubscriptionRegistry>> {
    Arc::new(Mutex::new(SubscriptionRegistry::new()))
}

async fn wait_for_connects(source: &ScriptedSource, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while source.connect_count() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "timed out waiting for {} connects, saw {}",
            expected,
            source.connect_count()
        )
    });
}

/// Drain events in the background so the supervisor never blocks on a full
/// event channel.
fn drain(mut stream: ReaderStream) {
    tokio::spawn(async move { while stream.events.recv().await.is_some() {} });
}

#[tokio::test]
async fn test_one_successor_per_failure() {
    let source = ScriptedSource::new(vec![
        vec![ReaderSignal::Failed("connection reset".to_string())],
        vec![ReaderSignal::Failed("connection reset".to_string())],
        vec![],
    ]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 3).await;

    // no further failures, no further instances
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.connect_count(), 3);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_failure_signals_create_one_successor() {
    // overlapping error conditions: the first instance reports failure twice
    let source = ScriptedSource::new(vec![
        vec![
            ReaderSignal::Failed("read timeout".to_string()),
            ReaderSignal::Failed("socket closed".to_string()),
        ],
        vec![],
    ]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.connect_count(), 2);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_successor_resumes_at_last_observed_position() {
    let source = ScriptedSource::new(vec![
        vec![
            ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 1})], 100)),
            ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 2})], 250)),
            ReaderSignal::Failed("server gone away".to_string()),
        ],
        vec![],
    ]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 2).await;

    let configs = source.recorded_configs();
    assert_eq!(configs[0].resume_from, None);
    assert_eq!(configs[1].resume_from, Some(position(250)));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_resume_position_chains_across_failures() {
    let source = ScriptedSource::new(vec![
        vec![
            ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 1})], 100)),
            ReaderSignal::Failed("gone".to_string()),
        ],
        // the second instance fails before observing any event
        vec![ReaderSignal::Failed("gone again".to_string())],
        vec![],
    ]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 3).await;

    let configs = source.recorded_configs();
    assert_eq!(configs[1].resume_from, Some(position(100)));
    // an event-less predecessor passes its own start position on unchanged
    assert_eq!(configs[2].resume_from, Some(position(100)));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_during_retry_delay_creates_no_successor() {
    let source = ScriptedSource::new(vec![vec![ReaderSignal::Failed(
        "connection reset".to_string(),
    )]]);

    // long retry delay so shutdown lands inside it
    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(5_000));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("shutdown must not wait out the retry delay")
        .unwrap();
    assert_eq!(source.connect_count(), 1);
}

#[tokio::test]
async fn test_first_start_uses_registry_snapshot_and_start_at_end() {
    let source = ScriptedSource::new(vec![vec![]]);
    let registry = registry();
    registry
        .lock()
        .listen("shop", TableFilter::tables(["orders"]));

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry.clone(), options(10));
    let (handle, stream) = supervisor.spawn();
    drain(stream);

    wait_for_connects(&source, 1).await;

    let configs = source.recorded_configs();
    assert!(configs[0].start_at_end);
    assert_eq!(
        configs[0].include_schema.get("shop"),
        Some(&TableFilter::tables(["orders"]))
    );
    assert!(configs[0].include_events.contains("updaterows"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_notice_carries_generation_and_reason() {
    let source = ScriptedSource::new(vec![
        vec![
            ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 1})], 42)),
            ReaderSignal::Failed("server gone away".to_string()),
        ],
        vec![],
    ]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, stream) = supervisor.spawn();
    let ReaderStream {
        mut events,
        mut notices,
    } = stream;
    tokio::spawn(async move { while events.recv().await.is_some() {} });

    let notice = timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("expected a successor notice")
        .expect("notice channel closed early");

    assert_eq!(notice.generation, 1);
    assert_eq!(notice.reason, "server gone away");
    assert_eq!(notice.resume_from, Some(position(42)));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_events_forwarded_in_order() {
    let source = ScriptedSource::new(vec![vec![
        ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 1})], 10)),
        ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 2})], 20)),
        ReaderSignal::Event(insert_event("shop", "orders", vec![json!({"id": 3})], 30)),
    ]]);

    let supervisor =
        ConnectionSupervisor::new(source.clone(), registry(), options(10));
    let (handle, mut stream) = supervisor.spawn();

    let mut offsets = Vec::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(5), stream.events.recv())
            .await
            .expect("expected a forwarded event")
            .expect("event channel closed early");
        offsets.push(event.next_position.offset);
    }
    assert_eq!(offsets, vec![10, 20, 30]);

    handle.stop().await.unwrap();
}
