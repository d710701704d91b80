// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use orchestrs::domain::models::job::{CreateJobRequest, JobStatus, PriorityTier};
use orchestrs::domain::models::worker::{RecommendedAction, WorkerStatus};
use serde_json::json;

#[tokio::test]
async fn test_dependent_job_inherits_priority_and_activates_on_completion() {
    let app = create_test_app().await;
    let worker = app.register_worker("deps", 2).await;

    let a = app
        .jobs
        .create_job(CreateJobRequest::new("A", json!({})).with_priority(5))
        .await
        .unwrap();
    let b = app
        .jobs
        .create_job(
            CreateJobRequest::new("B", json!({}))
                .with_priority(1)
                .depends_on([a.id]),
        )
        .await
        .unwrap();

    assert_eq!(b.priority, 5);
    assert_eq!(b.status, JobStatus::Pending);
    assert_eq!(app.tier_ids(PriorityTier::High).await, vec![a.id]);

    assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(a.id));
    let outcome = app
        .jobs
        .complete_job(a.id, json!({"done": true}))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.activated, vec![b.id]);
    assert_eq!(app.tier_ids(PriorityTier::High).await, vec![b.id]);
    assert!(app.tier_ids(PriorityTier::Low).await.is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_end_in_dead_letter() {
    let app = create_test_app().await;
    let worker = app.register_worker("retries", 1).await;
    let job = app
        .jobs
        .create_job(
            CreateJobRequest::new("unreliable", json!({"url": "http://example.invalid"}))
                .with_priority(3)
                .with_max_retries(2),
        )
        .await
        .unwrap();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(job.id));
        let outcome = app
            .jobs
            .fail_job(job.id, json!({"error": "upstream 503"}))
            .await
            .unwrap()
            .unwrap();
        statuses.push(outcome.job.status);
    }

    assert_eq!(
        statuses,
        vec![JobStatus::Pending, JobStatus::Pending, JobStatus::Failed]
    );
    assert_eq!(app.jobs.acquire_job(worker, 0).await.unwrap(), None);

    let dead = app.jobs.list_dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job_id, job.id);
    assert_eq!(dead[0].retry_count, 2);
    assert_eq!(dead[0].error, json!({"error": "upstream 503"}));
}

#[tokio::test]
async fn test_starved_low_priority_jobs_are_promoted() {
    let app = create_test_app().await;
    let worker = app.register_worker("starved", 1).await;

    let mut ids = Vec::new();
    for i in 0..10 {
        let job = app
            .jobs
            .create_job(CreateJobRequest::new("batch", json!({"index": i})).with_priority(1))
            .await
            .unwrap();
        ids.push(job.id);
    }
    assert_eq!(app.tier_ids(PriorityTier::Low).await, ids);

    for id in &ids {
        app.queue.backdate(*id, chrono::Duration::seconds(61));
    }

    assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(ids[0]));
    assert_eq!(app.tier_ids(PriorityTier::Medium).await, ids[1..].to_vec());
    assert!(app.tier_ids(PriorityTier::Low).await.is_empty());

    // Stored priority is raised to the medium tier floor
    for id in &ids {
        assert_eq!(app.jobs.get_job(*id).await.unwrap().priority, 2);
    }
}

#[tokio::test]
async fn test_declining_worker_is_flagged_for_restart() {
    let app = create_test_app().await;
    let worker = app.register_worker("declining", 2).await;

    for score in [1.0, 0.9, 0.75, 0.6, 0.45, 0.3] {
        app.monitor.record_health_score(worker, score).await.unwrap();
    }

    let prediction = app.monitor.predict_failure(worker).await.unwrap();
    assert!(prediction.probability > 0.7, "probability = {}", prediction.probability);
    assert_eq!(
        prediction.recommended_action,
        RecommendedAction::PreemptiveRestart
    );
    assert!((prediction.current_score - 0.3).abs() < 1e-9);
    assert!(prediction.degradation_rate > 0.0);

    let health = app.monitor.get_worker_health(worker).await.unwrap();
    assert_eq!(health.status, WorkerStatus::Degraded);
}
