// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use orchestrs::domain::models::job::{CreateJobRequest, ExecutionStatus, JobStatus, PriorityTier};
use orchestrs::domain::models::worker::WorkerStatus;
use serde_json::json;

#[tokio::test]
async fn test_pipeline_runs_in_dependency_order() {
    let app = create_test_app().await;
    let worker = app.register_worker("pipeline", 4).await;

    let extract = app
        .jobs
        .create_job(CreateJobRequest::new("extract", json!({"source": "s3"})).with_priority(3))
        .await
        .unwrap();
    let transform = app
        .jobs
        .create_job(
            CreateJobRequest::new("transform", json!({}))
                .with_priority(1)
                .depends_on([extract.id]),
        )
        .await
        .unwrap();
    let load = app
        .jobs
        .create_job(
            CreateJobRequest::new("load", json!({}))
                .with_priority(1)
                .depends_on([transform.id]),
        )
        .await
        .unwrap();

    // Priority is inherited down the chain
    assert_eq!(transform.priority, 3);
    assert_eq!(load.priority, 3);
    assert_eq!(app.tier_ids(PriorityTier::Medium).await, vec![extract.id]);

    let mut order = Vec::new();
    while let Some(job_id) = app.jobs.acquire_job(worker, 0).await.unwrap() {
        order.push(job_id);
        let outcome = app
            .jobs
            .complete_job(job_id, json!({"ok": true}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.job.status, JobStatus::Completed);
    }

    assert_eq!(order, vec![extract.id, transform.id, load.id]);
    assert_eq!(app.jobs.get_dependents(extract.id).await.unwrap(), vec![transform.id]);

    let health = app.monitor.get_worker_health(worker).await.unwrap();
    assert_eq!(health.load, 0);
    assert_eq!(health.status, WorkerStatus::Active);
}

#[tokio::test]
async fn test_failed_attempts_are_recorded_per_execution() {
    let app = create_test_app().await;
    let worker = app.register_worker("flaky", 1).await;
    let job = app
        .jobs
        .create_job(
            CreateJobRequest::new("flaky", json!({}))
                .with_priority(4)
                .with_max_retries(3),
        )
        .await
        .unwrap();

    for attempt in 0..2 {
        assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(job.id));
        let outcome = app
            .jobs
            .fail_job(job.id, json!({"error": "connection reset", "attempt": attempt}))
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.retried);
    }
    assert_eq!(app.jobs.acquire_job(worker, 1).await.unwrap(), Some(job.id));
    app.jobs.complete_job(job.id, json!({"rows": 3})).await.unwrap();

    let statuses: Vec<ExecutionStatus> = app
        .jobs
        .list_executions(job.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ExecutionStatus::Failed,
            ExecutionStatus::Failed,
            ExecutionStatus::Completed
        ]
    );

    let job = app.jobs.get_job(job.id).await.unwrap();
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.result, Some(json!({"rows": 3})));
    assert!(app.jobs.list_dead_letters(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_evacuation_moves_work_to_another_worker() {
    let app = create_test_app().await;
    let leaving = app.register_worker("leaving", 2).await;
    let staying = app.register_worker("staying", 2).await;

    let job = app
        .jobs
        .create_job(CreateJobRequest::new("encode", json!({})).with_priority(2))
        .await
        .unwrap();
    assert_eq!(app.jobs.acquire_job(leaving, 1).await.unwrap(), Some(job.id));

    let reassigned = app
        .monitor
        .evacuate_worker(leaving, "spot instance reclaimed", true)
        .await
        .unwrap();
    assert_eq!(reassigned, vec![job.id]);

    assert_eq!(app.jobs.acquire_job(leaving, 0).await.unwrap(), None);
    assert_eq!(app.jobs.acquire_job(staying, 1).await.unwrap(), Some(job.id));

    // Reassignment closes the first execution
    let executions = app.jobs.list_executions(job.id).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].status, ExecutionStatus::Reassigned);
    assert_eq!(executions[1].worker_id, staying);
}
