// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{build_app, create_test_app};
use chrono::Utc;
use orchestrs::domain::models::job::{CreateJobRequest, JobStatus, PriorityTier};
use orchestrs::domain::models::snapshot::{CreateSnapshotRequest, RestoreOptions};
use orchestrs::domain::models::worker::WorkerStatus;
use orchestrs::queue::memory_queue::MemoryPriorityQueue;
use orchestrs::utils::errors::OrchestratorError;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_restore_after_restart_rebuilds_lost_queue() {
    let app = create_test_app().await;
    let worker = app.register_worker("before-crash", 2).await;

    let done = app
        .jobs
        .create_job(CreateJobRequest::new("ingest", json!({})).with_priority(4))
        .await
        .unwrap();
    let waiting = app
        .jobs
        .create_job(CreateJobRequest::new("index", json!({})).with_priority(2))
        .await
        .unwrap();
    assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(done.id));
    app.jobs.complete_job(done.id, json!({})).await.unwrap();

    let snapshot = app
        .persistence
        .create_snapshot(CreateSnapshotRequest::full().with_description("pre-upgrade"))
        .await
        .unwrap();
    assert_eq!(snapshot.job_count, 2);
    assert_eq!(snapshot.worker_count, 1);

    // Process restart: the database survives, the in-memory queue does not
    let restarted = build_app(app.db.clone(), Arc::new(MemoryPriorityQueue::new()));
    assert!(restarted.tier_ids(PriorityTier::Medium).await.is_empty());

    let report = restarted
        .persistence
        .restore_from_snapshot(snapshot.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot_id, snapshot.id);
    assert_eq!(report.requeued, 1);
    assert!(report.conflicts.is_empty());
    assert_eq!(restarted.tier_ids(PriorityTier::Medium).await, vec![waiting.id]);

    assert_eq!(
        restarted.jobs.acquire_job(worker, 1).await.unwrap(),
        Some(waiting.id)
    );
    assert_eq!(
        restarted.jobs.get_job(done.id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_in_flight_jobs_survive_restore_and_move_off_dead_worker() {
    let app = create_test_app().await;
    let crashed = app.register_worker("crashed", 1).await;
    let healthy = app.register_worker("healthy", 1).await;

    let job = app
        .jobs
        .create_job(CreateJobRequest::new("backup", json!({"volume": "db-1"})).with_priority(5))
        .await
        .unwrap();
    assert_eq!(app.jobs.acquire_job(crashed, 1).await.unwrap(), Some(job.id));
    let snapshot = app
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();

    let restarted = build_app(app.db.clone(), Arc::new(MemoryPriorityQueue::new()));
    let report = restarted
        .persistence
        .restore_from_snapshot(snapshot.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.requeued, 0);
    assert_eq!(
        restarted.jobs.get_job(job.id).await.unwrap().status,
        JobStatus::Processing
    );

    let reassigned = restarted.monitor.mark_worker_failed(crashed).await.unwrap();
    assert_eq!(reassigned, vec![job.id]);
    assert_eq!(
        restarted.monitor.get_worker_health(crashed).await.unwrap().status,
        WorkerStatus::Failed
    );
    assert_eq!(
        restarted.jobs.acquire_job(healthy, 1).await.unwrap(),
        Some(job.id)
    );
}

#[tokio::test]
async fn test_point_in_time_recovery_uses_snapshot_before_timestamp() {
    let app = create_test_app().await;
    let before = Utc::now();

    let err = app
        .persistence
        .point_in_time_recovery(before, RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoSnapshotAvailable(_)));

    app.jobs
        .create_job(CreateJobRequest::new("nightly", json!({})).with_priority(1))
        .await
        .unwrap();
    let first = app
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = app
        .persistence
        .create_snapshot(CreateSnapshotRequest::incremental(first.id))
        .await
        .unwrap();

    let report = app
        .persistence
        .point_in_time_recovery(cutoff, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot_id, first.id);

    let report = app
        .persistence
        .point_in_time_recovery(Utc::now(), RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot_id, second.id);

    let listed: Vec<_> = app
        .persistence
        .list_snapshots()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_execution_contexts_are_searchable_from_database() {
    let app = create_test_app().await;

    let mut ids = Vec::new();
    for context in [
        json!({"task": "resize", "format": "png"}),
        json!({"task": "resize", "format": "png", "size": "large"}),
        json!({"task": "email", "recipient": "ops"}),
    ] {
        let job = app
            .jobs
            .create_job(CreateJobRequest::new("media", json!({})).with_priority(2))
            .await
            .unwrap();
        app.persistence
            .store_execution_context(job.id, context)
            .await
            .unwrap();
        ids.push(job.id);
    }

    let hits = app
        .persistence
        .search_similar_executions("resize png", 10, Some(0.5))
        .await
        .unwrap();
    let found: Vec<_> = hits.iter().map(|h| h.job_id).collect();
    assert_eq!(found, vec![ids[0], ids[1]]);

    let patterns = app
        .persistence
        .find_similar_patterns(ids[0], 1, Some(0.0))
        .await
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].job_id, ids[1]);

    let context = app
        .persistence
        .retrieve_execution_context(ids[2])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.context["recipient"], "ops");
}
