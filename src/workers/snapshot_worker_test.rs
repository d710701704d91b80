// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::config::settings::{DatabaseSettings, SchedulingSettings, SnapshotSettings};
use crate::domain::models::snapshot::SnapshotType;
use crate::domain::services::job_service::JobService;
use crate::infrastructure::database::connection::{create_pool, run_migrations};
use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use crate::infrastructure::repositories::memory_vector_store::MemoryVectorStore;
use crate::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
use crate::infrastructure::repositories::worker_repo_impl::WorkerRepositoryImpl;
use crate::queue::memory_queue::MemoryPriorityQueue;
use std::sync::Arc;

async fn setup_persistence(retention_secs: u64) -> StatePersistence {
    let db = Arc::new(create_pool(&DatabaseSettings::default()).await.unwrap());
    run_migrations(&db).await.unwrap();

    let jobs = Arc::new(JobRepositoryImpl::new(db.clone()));
    let workers = Arc::new(WorkerRepositoryImpl::new(db.clone()));
    let job_service = JobService::new(
        jobs.clone(),
        workers.clone(),
        Arc::new(MemoryPriorityQueue::new()),
        SchedulingSettings::default(),
    );

    StatePersistence::new(
        Arc::new(SnapshotRepositoryImpl::new(db)),
        jobs,
        workers,
        Arc::new(MemoryVectorStore::new()),
        job_service,
        SnapshotSettings {
            retention_secs,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_run_once_creates_auto_snapshot() {
    let persistence = setup_persistence(86_400).await;
    let worker = SnapshotWorker::new(persistence.clone(), Duration::from_secs(60));

    let id = worker.run_once().await.unwrap();

    let snapshots = persistence.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].id, id);
    assert_eq!(snapshots[0].snapshot_type, SnapshotType::Auto);
}

#[tokio::test]
async fn test_run_once_prunes_expired_snapshots() {
    let persistence = setup_persistence(0).await;
    let worker = SnapshotWorker::new(persistence.clone(), Duration::from_secs(60));

    // Zero retention expires the snapshot as soon as it is written
    worker.run_once().await.unwrap();
    assert!(persistence.list_snapshots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_loop_snapshots_until_cancelled() {
    let persistence = setup_persistence(86_400).await;
    let token = CancellationToken::new();
    let handle = SnapshotWorker::new(persistence.clone(), Duration::from_millis(20))
        .start(token.clone());

    tokio::time::sleep(Duration::from_millis(110)).await;
    token.cancel();
    handle.await.unwrap();

    assert!(!persistence.list_snapshots().await.unwrap().is_empty());
}
