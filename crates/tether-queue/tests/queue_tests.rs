// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drain behavior against a real HTTP server (wiremock).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_core::{QueuedRequest, RequestOptions, RequestStore};
use tether_queue::{OfflineQueue, QueueEvent, QueueSettings};
use tether_test_utils::{ManualClock, MemoryRequestStore};

struct Harness {
    queue: OfflineQueue,
    store: Arc<MemoryRequestStore>,
    clock: Arc<ManualClock>,
    events: mpsc::UnboundedReceiver<QueueEvent>,
    _events_sub: tether_bus::Subscription,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryRequestStore::new());
    harness_with(store.clone(), store, QueueSettings::default())
}

fn harness_with(
    store: Arc<MemoryRequestStore>,
    backend: Arc<dyn RequestStore>,
    settings: QueueSettings,
) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let settings = QueueSettings {
        request_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
        ..settings
    };
    let queue = OfflineQueue::new(backend, reqwest::Client::new(), settings, clock.clone());
    let (tx, events) = mpsc::unbounded_channel();
    let sub = queue.on_event(move |event| {
        let _ = tx.send(event.clone());
    });
    Harness {
        queue,
        store,
        clock,
        events,
        _events_sub: sub,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<QueueEvent>) -> QueueEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for queue event")
        .expect("event channel closed")
}

#[tokio::test]
async fn offline_enqueue_waits_for_online_then_delivers_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness();
    h.queue.set_online(false);

    let url = format!("{}/api/tasks", server.uri());
    let id = h
        .queue
        .enqueue(&url, RequestOptions::default().body("{}"), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.store.count().await.unwrap(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());

    h.queue.set_online(true);

    match next_event(&mut h.events).await {
        QueueEvent::Succeeded { request, response } => {
            assert_eq!(request.id, id);
            assert_eq!(response.status, 200);
            assert_eq!(response.body, r#"{"id":1}"#);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn server_errors_are_retried_until_budget_runs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let mut h = harness();
    h.queue.set_online(false);
    let url = format!("{}/flaky", server.uri());
    h.queue
        .enqueue(&url, RequestOptions::default(), Some(2))
        .await
        .unwrap();

    let first = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(first.attempted, 1);
    assert_eq!(first.retried, 1);
    let remaining = h.queue.queued_requests().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].retry_count, 1);

    let second = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(second.attempted, 1);
    assert_eq!(second.exhausted, 1);
    assert!(h.queue.queued_requests().await.unwrap().is_empty());

    match next_event(&mut h.events).await {
        QueueEvent::Exhausted {
            request,
            last_error,
        } => {
            assert_eq!(request.retry_count, 2);
            assert!(last_error.unwrap().contains("503"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    let third = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(third.attempted, 0);
}

#[tokio::test]
async fn client_error_removes_after_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/tasks/9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness();
    h.queue.set_online(false);
    let url = format!("{}/tasks/9", server.uri());
    h.queue
        .enqueue(&url, RequestOptions::new("put"), None)
        .await
        .unwrap();

    let summary = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);

    let event = next_event(&mut h.events).await;
    assert_eq!(event.name(), "offline-queue-failure");
    match event {
        QueueEvent::Failed { error, .. } => assert!(error.contains("404")),
        other => panic!("expected failure, got {other:?}"),
    }

    assert_eq!(h.queue.drain().await.unwrap().unwrap().attempted, 0);
}

#[tokio::test]
async fn single_pass_replays_in_enqueue_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let h = harness();
    h.queue.set_online(false);
    for name in ["first", "second", "third"] {
        let url = format!("{}/{name}", server.uri());
        h.queue
            .enqueue(&url, RequestOptions::default(), None)
            .await
            .unwrap();
        h.clock.advance(10);
    }

    let summary = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 3);

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/first", "/second", "/third"]);
}

#[tokio::test]
async fn concurrent_drain_does_not_double_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.queue.set_online(false);
    let url = format!("{}/slow", server.uri());
    h.queue
        .enqueue(&url, RequestOptions::default(), None)
        .await
        .unwrap();

    let first = {
        let queue = h.queue.clone();
        tokio::spawn(async move { queue.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.queue.is_draining());
    assert_eq!(h.queue.drain().await.unwrap(), None);

    let summary = first.await.unwrap().unwrap().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(!h.queue.is_draining());
}

#[tokio::test]
async fn stored_headers_and_body_are_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/tasks/1"))
        .and(header("x-trace-id", "abc"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"done":true}"#))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.queue.set_online(false);
    let options = RequestOptions::new("PATCH")
        .header("x-trace-id", "abc")
        .json(&serde_json::json!({"done": true}))
        .unwrap();
    h.queue
        .enqueue(&format!("{}/tasks/1", server.uri()), options, None)
        .await
        .unwrap();

    assert_eq!(h.queue.drain().await.unwrap().unwrap().succeeded, 1);
}

#[tokio::test]
async fn network_failure_counts_as_retry() {
    let mut h = harness();
    h.queue.set_online(false);
    // Nothing listens on port 9 (discard) in the test environment.
    h.queue
        .enqueue("http://127.0.0.1:9/unreachable", RequestOptions::default(), Some(1))
        .await
        .unwrap();

    let summary = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.exhausted, 1);
    match next_event(&mut h.events).await {
        QueueEvent::Exhausted { last_error, .. } => {
            assert!(last_error.unwrap().contains("request failed"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_response_times_out_and_counts_as_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut h = harness();
    let settings = QueueSettings {
        request_delay: Duration::ZERO,
        request_timeout: Duration::from_millis(100),
        ..QueueSettings::default()
    };
    let queue = OfflineQueue::new(h.store.clone(), reqwest::Client::new(), settings, h.clock.clone());
    let (tx, mut events) = mpsc::unbounded_channel();
    let _sub = queue.on_event(move |event| {
        let _ = tx.send(event.clone());
    });
    queue.set_online(false);
    h.queue.set_online(false);

    let url = format!("{}/slow", server.uri());
    queue
        .enqueue(&url, RequestOptions::default(), Some(1))
        .await
        .unwrap();

    let summary = queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.exhausted, 1);
    match next_event(&mut events).await {
        QueueEvent::Exhausted { last_error, .. } => {
            let last_error = last_error.unwrap();
            assert!(last_error.contains("timed out"), "unexpected error: {last_error}");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn already_exhausted_entry_is_dropped_without_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut h = harness();
    h.queue.set_online(false);
    let mut stale = QueuedRequest::new(
        &format!("{}/stale", server.uri()),
        RequestOptions::default(),
        2,
        1,
    );
    stale.retry_count = 2;
    h.store.insert(&stale).await.unwrap();

    let summary = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.exhausted, 1);
    match next_event(&mut h.events).await {
        QueueEvent::Exhausted {
            request,
            last_error,
        } => {
            assert_eq!(request.id, stale.id);
            assert!(last_error.is_none());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn periodic_task_drains_while_online() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRequestStore::new());
    let settings = QueueSettings {
        drain_interval: Duration::from_millis(100),
        ..QueueSettings::default()
    };
    let mut h = harness_with(store.clone(), store, settings);

    // Persisted by an earlier session, before this queue existed.
    let earlier = QueuedRequest::new(
        &format!("{}/earlier", server.uri()),
        RequestOptions::default(),
        3,
        1,
    );
    h.store.insert(&earlier).await.unwrap();

    h.queue.start();
    h.queue.start();
    let event = next_event(&mut h.events).await;
    assert_eq!(event.request().id, earlier.id);

    h.queue.shutdown().await;
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_backed_queue_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/persisted"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = tether_config::model::StorageConfig {
        database_path: dir.path().join("queue.db").display().to_string(),
        wal_mode: true,
    };
    let url = format!("{}/persisted", server.uri());

    {
        let store = tether_storage::SqliteRequestStore::open(&config).await.unwrap();
        let h = harness_with(
            Arc::new(MemoryRequestStore::new()),
            Arc::new(store),
            QueueSettings::default(),
        );
        h.queue.set_online(false);
        h.queue
            .enqueue(&url, RequestOptions::default(), None)
            .await
            .unwrap();
    }

    let store = Arc::new(tether_storage::SqliteRequestStore::open(&config).await.unwrap());
    let h = harness_with(
        Arc::new(MemoryRequestStore::new()),
        store.clone(),
        QueueSettings::default(),
    );
    h.queue.set_online(false);
    assert_eq!(h.queue.queued_requests().await.unwrap().len(), 1);

    let summary = h.queue.drain().await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(store.count().await.unwrap(), 0);
}
