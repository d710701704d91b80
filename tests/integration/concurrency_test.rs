// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use orchestrs::domain::models::job::{CreateJobRequest, JobStatus};
use serde_json::json;
use std::collections::HashSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_share_a_job() {
    let app = create_test_app().await;

    let mut created = HashSet::new();
    for i in 0..20 {
        let job = app
            .jobs
            .create_job(
                CreateJobRequest::new("render", json!({"frame": i})).with_priority(1 + i % 5),
            )
            .await
            .unwrap();
        created.insert(job.id);
    }

    let mut handles = Vec::new();
    for n in 0..4 {
        let worker = app.register_worker(&format!("renderer-{}", n), 5).await;
        let jobs = app.jobs.clone();
        handles.push(tokio::spawn(async move {
            let mut acquired = Vec::new();
            while let Some(job_id) = jobs.acquire_job(worker, 0).await.unwrap() {
                jobs.complete_job(job_id, json!({"worker": n}))
                    .await
                    .unwrap()
                    .expect("acquired job should be processing");
                acquired.push(job_id);
            }
            acquired
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 20, "a job was handed out more than once");
    assert_eq!(unique, created);

    for id in created {
        let job = app.jobs.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(app.jobs.list_executions(id).await.unwrap().len(), 1);
    }
    assert_eq!(app.jobs.queue_depths().await.unwrap().total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_activate_dependent_once() {
    let app = create_test_app().await;
    let worker = app.register_worker("fan-in", 10).await;

    let mut parents = Vec::new();
    for i in 0..5 {
        let job = app
            .jobs
            .create_job(CreateJobRequest::new("shard", json!({"shard": i})).with_priority(3))
            .await
            .unwrap();
        parents.push(job.id);
    }
    let merge = app
        .jobs
        .create_job(
            CreateJobRequest::new("merge", json!({}))
                .with_priority(3)
                .depends_on(parents.clone()),
        )
        .await
        .unwrap();

    for _ in 0..parents.len() {
        app.jobs.acquire_job(worker, 1).await.unwrap().unwrap();
    }

    let mut handles = Vec::new();
    for id in parents {
        let jobs = app.jobs.clone();
        handles.push(tokio::spawn(async move {
            jobs.complete_job(id, json!({})).await.unwrap().unwrap().activated
        }));
    }
    let mut activated = Vec::new();
    for handle in handles {
        activated.extend(handle.await.unwrap());
    }

    assert_eq!(activated, vec![merge.id]);
    assert_eq!(app.jobs.queue_depths().await.unwrap().total(), 1);
}
