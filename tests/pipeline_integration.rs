//! Pipeline Integration Tests
//!
//! Accumulator → dispatcher → coordinator with scripted channels and a
//! recording sleeper, so retry timing is observed without waiting.

use serde_json::{json, Map};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use telemetry_uplink::delivery::{
    AttemptError, BackoffPolicy, ChannelKind, ChannelUploader, RetryPolicy, UploadCoordinator,
    UploadError, UploadReport,
};
use telemetry_uplink::pipeline::{DispatchRecord, UploadDispatcher};
use telemetry_uplink::storage::LocalFallbackStore;
use telemetry_uplink::testing::{RecordingSleeper, ScriptedTransport};
use telemetry_uplink::{Event, Uplink, UplinkConfig, UplinkError};
use tokio::sync::mpsc::UnboundedReceiver;

fn event(name: &str, seq: u64) -> Event {
    let mut payload = Map::new();
    payload.insert("seq".to_string(), json!(seq));
    Event::now(name, payload)
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        backoff: BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(30)),
        attempt_timeout: Duration::from_secs(5),
    }
}

struct Rig {
    uplink: Uplink,
    dispatcher: Arc<UploadDispatcher>,
    outcomes: UnboundedReceiver<DispatchRecord>,
    primary: Arc<ScriptedTransport>,
    secondary: Arc<ScriptedTransport>,
    sleeper: Arc<RecordingSleeper>,
    store: LocalFallbackStore,
}

fn rig(
    threshold: usize,
    primary: ScriptedTransport,
    secondary: ScriptedTransport,
    fallback_dir: &Path,
) -> Rig {
    let primary = Arc::new(primary);
    let secondary = Arc::new(secondary);
    let sleeper = Arc::new(RecordingSleeper::default());
    let store = LocalFallbackStore::open(fallback_dir).unwrap();

    let coordinator = Arc::new(UploadCoordinator::new(
        ChannelUploader::with_sleeper(primary.clone(), policy(), sleeper.clone()),
        ChannelUploader::with_sleeper(secondary.clone(), policy(), sleeper.clone()),
        store.clone(),
    ));
    let (dispatcher, outcomes) = UploadDispatcher::new(coordinator).with_outcomes();

    let dispatcher = Arc::new(dispatcher);

    Rig {
        uplink: Uplink::from_parts(threshold, dispatcher.clone()),
        dispatcher,
        outcomes,
        primary,
        secondary,
        sleeper,
        store,
    }
}

/// threshold=2; the primary fails four times in a row, the secondary
/// accepts on its first attempt, and the local store is never touched.
#[tokio::test]
async fn test_threshold_two_primary_down_secondary_delivers() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rig = rig(
        2,
        ScriptedTransport::failing_times(
            ChannelKind::Primary,
            4,
            &AttemptError::Transport("connection refused".into()),
        ),
        ScriptedTransport::always_ok(ChannelKind::Secondary),
        tmp.path(),
    );

    rig.uplink.process(event("e1", 1));
    assert_eq!(rig.uplink.stats().submitted, 0);
    assert_eq!(rig.uplink.accumulator().pending(), 1);

    rig.uplink.process(event("e2", 2));
    assert_eq!(rig.uplink.stats().submitted, 1);
    assert_eq!(rig.uplink.accumulator().pending(), 0);

    let record = rig.outcomes.recv().await.unwrap();
    assert_eq!(record.events, 2);
    let report = record.result.unwrap();
    assert_eq!(report.label(), "delivered-secondary");
    assert!(matches!(
        report,
        UploadReport::DeliveredSecondary { attempts: 1, .. }
    ));

    assert_eq!(rig.primary.calls(), 4);
    assert_eq!(rig.secondary.calls(), 1);
    assert_eq!(
        rig.sleeper.delays(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
        ]
    );
    assert!(rig.store.pending().unwrap().is_empty());

    // Both events reached the secondary in their original order
    let body = &rig.secondary.bodies()[0];
    let sent: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(sent[0]["eventType"], json!("e1"));
    assert_eq!(sent[1]["eventType"], json!("e2"));

    let stats = rig.uplink.shutdown().await;
    assert_eq!(stats.delivered_secondary, 1);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_flush_delivers_partial_batch_and_empty_flush_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rig = rig(
        100,
        ScriptedTransport::always_ok(ChannelKind::Primary),
        ScriptedTransport::always_ok(ChannelKind::Secondary),
        tmp.path(),
    );

    assert!(!rig.uplink.flush());
    for i in 0..7 {
        rig.uplink.process(event("tap", i));
    }
    assert!(rig.uplink.flush());
    assert!(!rig.uplink.flush());

    let record = rig.outcomes.recv().await.unwrap();
    assert_eq!(record.events, 7);
    assert!(matches!(
        record.result,
        Ok(UploadReport::DeliveredPrimary { attempts: 1 })
    ));

    let stats = rig.uplink.shutdown().await;
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.delivered_primary, 1);
    assert_eq!(rig.secondary.calls(), 0);
}

#[tokio::test]
async fn test_both_channels_down_persists_every_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let rig = rig(
        3,
        ScriptedTransport::always_failing(ChannelKind::Primary, AttemptError::Response { status: 500 }),
        ScriptedTransport::always_failing(ChannelKind::Secondary, AttemptError::Response { status: 503 }),
        tmp.path(),
    );

    for i in 0..9 {
        rig.uplink.process(event("tap", i));
    }
    let stats = rig.uplink.shutdown().await;

    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.persisted_locally, 3);
    assert_eq!(stats.lost, 0);

    let files = rig.store.pending().unwrap();
    assert_eq!(files.len(), 3);
    let mut seqs: Vec<u64> = files
        .iter()
        .flat_map(|p| {
            rig.store
                .load(p)
                .unwrap()
                .events()
                .iter()
                .map(|e| e.payload()["seq"].as_u64().unwrap())
                .collect::<Vec<_>>()
        })
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..9).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_unwritable_fallback_counts_batch_as_lost() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("fallback");
    let mut rig = rig(
        1,
        ScriptedTransport::always_failing(ChannelKind::Primary, AttemptError::Response { status: 500 }),
        ScriptedTransport::always_failing(ChannelKind::Secondary, AttemptError::Transport("dns".into())),
        &dir,
    );
    std::fs::remove_dir(&dir).unwrap();
    std::fs::write(&dir, b"blocked").unwrap();

    rig.uplink.process(event("tap", 0));

    let record = rig.outcomes.recv().await.unwrap();
    assert!(matches!(record.result, Err(UploadError::Persistence { .. })));

    let stats = rig.uplink.shutdown().await;
    assert_eq!(stats.lost, 1);
}

#[tokio::test]
async fn test_batches_are_delivered_concurrently() {
    let tmp = tempfile::tempdir().unwrap();
    let rig = rig(
        1,
        ScriptedTransport::always_ok(ChannelKind::Primary).with_latency(Duration::from_millis(200)),
        ScriptedTransport::always_ok(ChannelKind::Secondary),
        tmp.path(),
    );

    let started = std::time::Instant::now();
    for i in 0..4 {
        rig.uplink.process(event("tap", i));
    }
    // Submission returned without waiting on any send
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(rig.dispatcher.in_flight(), 4);

    let stats = rig.uplink.shutdown().await;
    assert_eq!(stats.delivered_primary, 4);
    assert_eq!(rig.dispatcher.in_flight(), 0);
    // Four sequential sends would take at least 800ms
    assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn test_producers_on_plain_threads() {
    let tmp = tempfile::tempdir().unwrap();
    let rig = rig(
        10,
        ScriptedTransport::always_ok(ChannelKind::Primary),
        ScriptedTransport::always_ok(ChannelKind::Secondary),
        tmp.path(),
    );

    std::thread::scope(|s| {
        for t in 0..4u64 {
            let uplink = &rig.uplink;
            s.spawn(move || {
                for i in 0..25 {
                    uplink.process(event("tap", t * 100 + i));
                }
            });
        }
    });

    let stats = rig.uplink.shutdown().await;
    assert_eq!(stats.submitted, 10);
    assert_eq!(stats.delivered_primary, 10);
    assert_eq!(rig.primary.calls(), 10);
}

#[tokio::test]
async fn test_from_config_rejects_invalid_config() {
    let result = Uplink::from_config(&UplinkConfig::default());
    assert!(matches!(result, Err(UplinkError::Config(_))));
}

fn valid_config(fallback_dir: &Path) -> UplinkConfig {
    let mut config = UplinkConfig::default();
    config.api.endpoint = "http://127.0.0.1:9/v1/events".to_string();
    config.api.api_key = "k".to_string();
    config.storage.bucket = "b".to_string();
    config.fallback.dir = fallback_dir.to_path_buf();
    config.batching.threshold = 5;
    config
}

#[test]
fn test_from_config_outside_runtime_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = valid_config(&tmp.path().join("fallback"));

    let result = Uplink::from_config(&config);
    assert!(matches!(result, Err(UplinkError::NoRuntime)));
    // Nothing was built
    assert!(!config.fallback.dir.exists());
}

#[tokio::test]
async fn test_from_config_builds_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let config = valid_config(&tmp.path().join("fallback"));

    let uplink = Uplink::from_config(&config).unwrap();
    assert_eq!(uplink.accumulator().threshold(), 5);
    assert!(config.fallback.dir.is_dir());

    // Nothing buffered, nothing to deliver
    let stats = uplink.shutdown().await;
    assert_eq!(stats.submitted, 0);
}
