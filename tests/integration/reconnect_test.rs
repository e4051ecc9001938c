//! Integration tests for the reconnect policy and subscription replay.

mod helpers;

use serde_json::json;

use pickr_core::events::SyncEvent;
use pickr_core::types::{ConnectionState, JobId};

use helpers::{TestClient, empty_queue, jobs_snapshot};

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_every_room_once() {
    let mut client = TestClient::start(0);
    let mut session = client.connect().await;
    session.emit(
        "jobs:current_state",
        jobs_snapshot(json!([
            {"jobId": "a", "restaurantId": 3, "type": "review_crawl", "status": "active"}
        ])),
    );
    session.emit("queue:current_state", empty_queue());
    assert_eq!(session.next_events(1).await, vec!["subscribe:restaurant:3"]);

    client.handle.ensure_subscribed(1).await.unwrap();
    client.handle.ensure_subscribed(2).await.unwrap();
    client.handle.ensure_subscribed(1).await.unwrap();
    assert_eq!(
        session.next_events(2).await,
        vec!["subscribe:restaurant:1", "subscribe:restaurant:2"]
    );

    drop(session);
    client
        .wait_view(|v| matches!(v.connection, ConnectionState::Reconnecting { .. }))
        .await;

    let mut session = client.accept().await;
    session.handshake().await;
    assert_eq!(
        session.next_events(5).await,
        vec![
            "subscribe:all_jobs",
            "subscribe:queue",
            "subscribe:restaurant:1",
            "subscribe:restaurant:2",
            "subscribe:restaurant:3",
        ]
    );

    let view = client.wait_view(|v| v.connection.is_connected()).await;
    assert!(view.loading);
    // Local state survives the drop until the fresh snapshot replaces it.
    assert!(view.job(&JobId::from("a")).is_some());
    assert_eq!(client.connector.attempts(), 2);
    assert_eq!(client.handle.metrics().snapshot().disconnects, 1);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refused_connects_are_retried() {
    let mut client = TestClient::start(2);
    let _session = client.connect().await;

    client.wait_view(|v| v.connection.is_connected()).await;
    assert_eq!(client.connector.attempts(), 3);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnects_surface_failure() {
    let client = TestClient::start(u32::MAX);

    let view = client
        .wait_view(|v| v.connection == ConnectionState::Failed && v.last_error.is_some())
        .await;
    assert!(view.last_error.as_deref().unwrap().contains('6'));
    assert_eq!(client.connector.attempts(), 6);
    assert!(client.events().iter().any(|e| matches!(
        e,
        SyncEvent::ConnectionChanged {
            state: ConnectionState::Failed
        }
    )));

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_timeout_leaves_stores_untouched() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;
    session.emit(
        "review:image_progress",
        json!({"jobId": "img", "current": 1, "total": 9}),
    );
    client.wait_view(|v| v.jobs.len() == 1).await;

    let view = client
        .wait_view(|v| !v.loading && v.last_error.is_some())
        .await;
    assert!(view.last_error.as_deref().unwrap().contains("snapshot"));
    assert_eq!(view.jobs.len(), 1);
    assert_eq!(client.handle.metrics().snapshot().snapshot_failures, 2);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_triggers_reconnect() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;
    session.push("41");

    let mut session = client.accept().await;
    session.handshake().await;
    assert_eq!(
        session.next_events(2).await,
        vec!["subscribe:all_jobs", "subscribe:queue"]
    );
    client.wait_view(|v| v.connection.is_connected()).await;

    client.handle.shutdown().await;
}
