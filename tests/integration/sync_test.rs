//! Integration tests for snapshot bootstrapping and live event application.

mod helpers;

use std::time::Duration;

use serde_json::json;

use pickr_core::events::SyncEvent;
use pickr_core::types::{ConnectionState, JobId, JobStatus};

use helpers::{TestClient, empty_queue, jobs_snapshot};

#[tokio::test(start_paused = true)]
async fn test_bootstrap_replaces_state_and_joins_rooms() {
    let mut client = TestClient::start(0);
    let mut session = client.connect().await;

    let loading = client.wait_view(|v| v.connection.is_connected()).await;
    assert!(loading.loading);

    session.emit(
        "jobs:current_state",
        jobs_snapshot(json!([
            {"jobId": "a", "restaurantId": 7, "type": "review_crawl", "status": "active",
             "progress": {"current": 2, "total": 10, "percentage": 20}},
            {"jobId": "b", "restaurantId": 8, "type": "review_summary", "status": "active"}
        ])),
    );
    session.emit("queue:current_state", empty_queue());

    let mut joins = session.next_events(2).await;
    joins.sort();
    assert_eq!(
        joins,
        vec!["subscribe:restaurant:7", "subscribe:restaurant:8"]
    );

    let view = client.wait_view(|v| !v.loading && v.jobs.len() == 2).await;
    assert_eq!(view.subscriptions, vec![7, 8]);
    assert_eq!(view.job(&JobId::from("a")).unwrap().progress.percentage, 20);
    assert_eq!(client.handle.metrics().snapshot().snapshots_applied, 2);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_completion_waits_for_grace_then_evicts() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;
    session.emit("jobs:current_state", jobs_snapshot(json!([])));
    session.emit("queue:current_state", empty_queue());
    client.wait_view(|v| v.connection.is_connected() && !v.loading).await;

    session.emit(
        "review:crawl_progress",
        json!({"jobId": "j1", "restaurantId": 3, "current": 50, "total": 50}),
    );
    let view = client.wait_view(|v| v.job(&JobId::from("j1")).is_some()).await;
    assert_eq!(view.job(&JobId::from("j1")).unwrap().status, JobStatus::Active);

    let view = client
        .wait_view(|v| {
            v.job(&JobId::from("j1"))
                .is_some_and(|job| job.status == JobStatus::Completed)
        })
        .await;
    assert!(view.job(&JobId::from("j1")).unwrap().completed_at.is_some());

    client
        .wait_view(|v| v.job(&JobId::from("j1")).is_none())
        .await;
    assert!(client.events().iter().any(|e| matches!(
        e,
        SyncEvent::JobRemoved { job_id } if job_id.as_str() == "j1"
    )));

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_error_inside_grace_window_wins() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;

    session.emit(
        "review_summary:progress",
        json!({"jobId": "s1", "restaurantId": 4, "current": 3, "total": 3}),
    );
    client.wait_view(|v| v.job(&JobId::from("s1")).is_some()).await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    session.emit(
        "review_summary:error",
        json!({"jobId": "s1", "error": "model overloaded"}),
    );
    let view = client
        .wait_view(|v| {
            v.job(&JobId::from("s1"))
                .is_some_and(|job| job.status == JobStatus::Failed)
        })
        .await;
    assert_eq!(
        view.job(&JobId::from("s1")).unwrap().error.as_deref(),
        Some("model overloaded")
    );

    tokio::time::sleep(Duration::from_millis(5000)).await;
    let completed = client.events().iter().any(|e| matches!(
        e,
        SyncEvent::JobUpdated { job } if job.status == JobStatus::Completed
    ));
    assert!(!completed);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_progress_is_dropped() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;

    for seq in [5, 3, 7] {
        session.emit(
            "review:db_progress",
            json!({"jobId": "j2", "sequence": seq, "current": seq, "total": 100}),
        );
    }

    let view = client
        .wait_view(|v| {
            v.job(&JobId::from("j2"))
                .is_some_and(|job| job.progress.current == 7)
        })
        .await;
    assert_eq!(view.job(&JobId::from("j2")).unwrap().progress.percentage, 7);
    assert_eq!(client.handle.metrics().snapshot().stale_dropped, 1);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_announced_job_joins_its_room_once() {
    let mut client = TestClient::start(0);
    let mut session = client.connect().await;

    let announce = json!({"jobId": "n1", "type": "restaurant_crawl", "restaurantId": 42});
    session.emit("job:new", announce.clone());
    session.emit("job:new", announce);
    assert_eq!(session.next_events(1).await, vec!["subscribe:restaurant:42"]);

    client.handle.ensure_subscribed(42).await.unwrap();
    client.handle.ensure_subscribed(43).await.unwrap();
    assert_eq!(session.next_events(1).await, vec!["subscribe:restaurant:43"]);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_jobs_error_keeps_previous_state() {
    let mut client = TestClient::start(0);
    let session = client.connect().await;
    session.emit(
        "jobs:current_state",
        jobs_snapshot(json!([
            {"jobId": "keep", "restaurantId": 1, "type": "review_crawl", "status": "active"}
        ])),
    );
    client.wait_view(|v| v.jobs.len() == 1).await;

    client.handle.refresh().await.unwrap();
    session.emit(
        "jobs:error",
        json!({"message": "Failed to load jobs", "error": "db locked"}),
    );

    let view = client.wait_view(|v| v.last_error.is_some()).await;
    assert_eq!(view.last_error.as_deref(), Some("Failed to load jobs: db locked"));
    assert_eq!(view.jobs.len(), 1);
    assert!(client.events().iter().any(|e| matches!(e, SyncEvent::SnapshotFailed { .. })));

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_lifecycle() {
    let mut client = TestClient::start(0);
    let mut session = client.connect().await;
    session.emit("queue:current_state", empty_queue());

    session.emit(
        "queue:job_added",
        json!({"queueId": "q1", "type": "review_crawl", "restaurantId": 5, "position": 1}),
    );
    assert_eq!(session.next_events(1).await, vec!["subscribe:queue"]);
    let view = client.wait_view(|v| v.queue.len() == 1).await;
    assert_eq!(view.stats.waiting, 1);

    session.emit("queue:job_started", json!({"queueId": "q1", "jobId": "j9"}));
    let view = client.wait_view(|v| v.stats.processing == 1).await;
    assert_eq!(view.stats.waiting, 0);

    session.emit("queue:job_completed", json!({"queueId": "q1"}));
    let view = client.wait_view(|v| v.queue.is_empty()).await;
    assert_eq!(view.stats.processing, 0);

    session.emit("queue:job_completed", json!({"queueId": "ghost"}));
    session.emit("queue:job_cancelled", json!({"queueId": "ghost"}));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let view = client.handle.view();
    assert_eq!(view.stats.processing, 0);
    assert_eq!(view.stats.waiting, 0);

    client.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_rooms_and_is_idempotent() {
    let mut client = TestClient::start(0);
    let mut session = client.connect().await;
    client.wait_view(|v| v.connection.is_connected()).await;

    client.handle.shutdown().await;
    assert_eq!(session.next_events(1).await, vec!["unsubscribe:all_jobs"]);
    assert!(session.closed().await);
    assert_eq!(client.handle.connection(), ConnectionState::Disconnected);

    client.handle.shutdown().await;
    assert!(client.handle.refresh().await.is_err());
}
