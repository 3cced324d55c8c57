//! Remote sync consumer: end-to-end scenarios against in-memory fakes.

mod support;

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::*;
use watchsync_agent::config::RemoteConfig;
use watchsync_agent::error::SyncError;
use watchsync_agent::remote::{
    MatchOutcome, MatchTier, MessageOutcome, POLL_INTERVAL_CHANGED, RemoteSyncConsumer,
};
use watchsync_agent::signal::Signal;
use watchsync_agent::{ConnectionStatus, ContentKind, RuntimeState};
use watchsync_auth::AuthError;

fn fast_config() -> RemoteConfig {
    RemoteConfig {
        message_pause_millis: 0,
        idle_check_millis: 10,
        ..RemoteConfig::default()
    }
}

struct Harness {
    catalog: Arc<FakeCatalog>,
    queue: Arc<FakeQueue>,
    state: Arc<RuntimeState>,
    wakeup: Signal,
    consumer: RemoteSyncConsumer,
}

fn harness(catalog: Arc<FakeCatalog>, queue: Arc<FakeQueue>) -> Harness {
    let state = Arc::new(RuntimeState::new(
        "https://queue.test/deviceA",
        Duration::from_secs(60),
    ));
    let wakeup = Signal::new();
    let consumer = RemoteSyncConsumer::new(
        state.clone(),
        catalog.clone(),
        queue.clone(),
        LOCAL_DEVICE,
        wakeup.clone(),
        &fast_config(),
    );
    Harness {
        catalog,
        queue,
        state,
        wakeup,
        consumer,
    }
}

#[tokio::test]
async fn matched_update_is_applied_and_deleted() {
    let h = harness(
        FakeCatalog::with_entries(vec![Entry::movie(42, "/movies/", "x.mkv", ids(&[("imdb", "tt1")]))]),
        FakeQueue::with_messages(vec![remote_message(
            "r-1",
            REMOTE_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        )]),
    );

    assert_eq!(h.consumer.drain().await, 1);

    let writes = h.catalog.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, ContentKind::Movie);
    assert_eq!(writes[0].1, 42);
    assert_eq!(writes[0].2.playcount, 1);
    assert_eq!(writes[0].2.resume.position, 120.0);
    assert_eq!(h.queue.deleted(), vec!["r-1".to_string()]);
    assert!(h.state.is_update_expected(ContentKind::Movie, 42));
    assert_eq!(h.state.status(), ConnectionStatus::Online);
}

#[tokio::test]
async fn unmatched_update_requests_scan_and_stays_queued() {
    let h = harness(
        FakeCatalog::new(),
        FakeQueue::with_messages(vec![remote_message(
            "r-1",
            REMOTE_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        )]),
    );

    h.consumer.drain().await;

    assert_eq!(h.catalog.scans(), vec![Some("/movies/".to_string())]);
    assert!(h.state.was_scanned("/movies/"));
    assert!(h.queue.deleted().is_empty());
    assert_eq!(h.queue.undeleted(), vec!["r-1".to_string()]);
}

#[tokio::test]
async fn second_miss_is_consumed_without_another_scan() {
    let body = movie_update_body(42, "/movies/", "x.mkv", "tt1");
    let h = harness(
        FakeCatalog::new(),
        FakeQueue::with_messages(vec![
            remote_message("r-1", REMOTE_DEVICE, UPDATE_EVENT, body.clone()),
            remote_message("r-2", REMOTE_DEVICE, UPDATE_EVENT, body),
        ]),
    );

    h.consumer.drain().await;

    assert_eq!(h.catalog.scans().len(), 1);
    assert_eq!(h.queue.deleted(), vec!["r-2".to_string()]);
    assert!(!h.state.was_scanned("/movies/"));
}

#[tokio::test]
async fn own_messages_are_consumed_without_catalog_calls() {
    let h = harness(
        FakeCatalog::with_entries(vec![Entry::movie(42, "/movies/", "x.mkv", ids(&[]))]),
        FakeQueue::with_messages(vec![remote_message(
            "r-1",
            LOCAL_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        )]),
    );

    h.consumer.drain().await;

    assert!(h.catalog.calls().is_empty());
    assert_eq!(h.queue.deleted(), vec!["r-1".to_string()]);
}

#[tokio::test]
async fn poll_interval_change_is_floored() {
    let h = harness(
        FakeCatalog::new(),
        FakeQueue::with_messages(vec![
            remote_message("r-1", REMOTE_DEVICE, POLL_INTERVAL_CHANGED, json!({ "new_poll_interval": 3 })),
        ]),
    );

    let outcome = h.consumer.handle_message(&remote_message(
        "r-0",
        REMOTE_DEVICE,
        POLL_INTERVAL_CHANGED,
        json!({ "new_poll_interval": 30 }),
    ))
    .await
    .unwrap();
    assert_eq!(outcome, MessageOutcome::PollIntervalChanged(Duration::from_secs(30)));

    h.consumer.drain().await;
    assert_eq!(h.state.poll_interval(), Duration::from_secs(10));
    assert_eq!(h.queue.deleted(), vec!["r-1".to_string()]);
}

#[tokio::test]
async fn unknown_and_malformed_messages_are_discarded() {
    let h = harness(
        FakeCatalog::new(),
        FakeQueue::with_messages(vec![
            remote_message("r-1", REMOTE_DEVICE, "kodi.something.else", json!({})),
            remote_message("r-2", REMOTE_DEVICE, UPDATE_EVENT, json!({ "notification": {} })),
        ]),
    );

    assert_eq!(h.consumer.drain().await, 2);
    assert_eq!(h.queue.deleted(), vec!["r-1".to_string(), "r-2".to_string()]);
    assert!(h.catalog.calls().is_empty());
}

#[tokio::test]
async fn catalog_failure_leaves_message_for_redelivery() {
    let catalog = FakeCatalog::with_entries(vec![Entry::movie(42, "/movies/", "x.mkv", ids(&[]))]);
    catalog.fail_writes.store(true, Ordering::SeqCst);
    let h = harness(
        catalog,
        FakeQueue::with_messages(vec![remote_message(
            "r-1",
            REMOTE_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        )]),
    );

    assert_eq!(h.consumer.drain().await, 1);
    assert!(h.queue.deleted().is_empty());
}

#[tokio::test]
async fn busy_player_defers_everything() {
    let catalog = FakeCatalog::with_entries(vec![Entry::movie(42, "/movies/", "x.mkv", ids(&[]))]);
    catalog.playing.store(true, Ordering::SeqCst);
    let h = harness(
        catalog,
        FakeQueue::with_messages(vec![remote_message(
            "r-1",
            REMOTE_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        )]),
    );

    assert_eq!(h.consumer.drain().await, 0);
    assert_eq!(h.queue.receives.load(Ordering::SeqCst), 0);
    assert_eq!(h.queue.pending(), 1);

    h.catalog.playing.store(false, Ordering::SeqCst);
    h.catalog.scanning.store(true, Ordering::SeqCst);
    assert_eq!(h.consumer.drain().await, 0);

    h.catalog.scanning.store(false, Ordering::SeqCst);
    assert_eq!(h.consumer.drain().await, 1);
    assert_eq!(h.catalog.writes().len(), 1);
}

#[tokio::test]
async fn transient_receive_failure_reports_offline() {
    let h = harness(FakeCatalog::new(), FakeQueue::with_messages(vec![]));
    h.state.set_status(ConnectionStatus::Online);
    h.queue
        .fail_with(|| SyncError::Queue("connection reset".into()));

    assert_eq!(h.consumer.drain().await, 0);
    assert_eq!(h.state.status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn rejected_credentials_report_auth_failure() {
    let h = harness(FakeCatalog::new(), FakeQueue::with_messages(vec![]));
    h.queue
        .fail_with(|| SyncError::Auth(AuthError::Client("401 invalid_client".into())));

    h.consumer.drain().await;

    assert!(matches!(h.state.status(), ConnectionStatus::AuthFailed(_)));
}

#[tokio::test]
async fn wakeup_triggers_poll_and_stop_is_prompt() {
    let h = harness(FakeCatalog::new(), FakeQueue::with_messages(vec![]));
    let queue = h.queue.clone();
    let wakeup = h.wakeup.clone();
    let state = h.state.clone();
    let worker = h.consumer.spawn();

    // The poll interval is 60s; only the wakeup can cause a receive this soon.
    wakeup.set();
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.receives.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("wakeup led to a poll");

    tokio::time::timeout(Duration::from_secs(3), worker.stop())
        .await
        .expect("consumer stopped within one wait cycle");
    assert_eq!(state.status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn identity_match_is_reported() {
    let catalog = FakeCatalog::with_entries(vec![Entry::movie(
        5,
        "/films/",
        "x.mkv",
        ids(&[("imdb", "tt1")]),
    )]);
    let h = harness(catalog, FakeQueue::with_messages(vec![]));

    let outcome = h
        .consumer
        .handle_message(&remote_message(
            "r-1",
            REMOTE_DEVICE,
            UPDATE_EVENT,
            movie_update_body(42, "/movies/", "x.mkv", "tt1"),
        ))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MessageOutcome::Matched(MatchOutcome::Updated {
            tier: MatchTier::Identity,
            updated: 1
        })
    );
}

async fn wait_until(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should hold");
}

#[tokio::test]
async fn stop_interrupts_a_pending_receive() {
    let queue = FakeQueue::with_messages(vec![]);
    queue.stall_receive.store(true, Ordering::SeqCst);
    let h = harness(FakeCatalog::new(), queue);
    h.wakeup.set();

    let worker = h.consumer.spawn();
    wait_until(|| h.queue.receives.load(Ordering::SeqCst) >= 1).await;

    tokio::time::timeout(Duration::from_secs(2), worker.stop())
        .await
        .expect("stop should not wait for the receive to finish");
    assert!(!worker.is_running().await);
    assert_eq!(h.state.status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn stop_interrupts_a_pending_busy_probe() {
    let catalog = FakeCatalog::new();
    catalog.stall_busy_probe.store(true, Ordering::SeqCst);
    let h = harness(catalog, FakeQueue::with_messages(vec![]));
    h.wakeup.set();

    let worker = h.consumer.spawn();
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(2), worker.stop())
        .await
        .expect("stop should not wait for the busy probe");
    assert_eq!(h.queue.receives.load(Ordering::SeqCst), 0);
}
