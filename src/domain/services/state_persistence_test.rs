// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::config::settings::{DatabaseSettings, SchedulingSettings};
use crate::domain::models::job::CreateJobRequest;
use crate::domain::models::worker::SpawnWorkerRequest;
use crate::infrastructure::database::connection::{create_pool, run_migrations};
use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use crate::infrastructure::repositories::memory_vector_store::MemoryVectorStore;
use crate::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
use crate::infrastructure::repositories::worker_repo_impl::WorkerRepositoryImpl;
use crate::queue::memory_queue::MemoryPriorityQueue;
use serde_json::json;

struct Harness {
    persistence: StatePersistence,
    jobs: JobService,
    workers: Arc<WorkerRepositoryImpl>,
    snapshots: Arc<SnapshotRepositoryImpl>,
    vectors: Arc<MemoryVectorStore>,
    memory: Arc<InMemoryCoordination>,
}

async fn harness_with(settings: SnapshotSettings) -> Harness {
    let db = Arc::new(create_pool(&DatabaseSettings::default()).await.unwrap());
    run_migrations(&db).await.unwrap();

    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let workers = Arc::new(WorkerRepositoryImpl::new(db.clone()));
    let snapshots = Arc::new(SnapshotRepositoryImpl::new(db));
    let vectors = Arc::new(MemoryVectorStore::new());
    let scheduling = SchedulingSettings {
        retry_backoff_base_ms: 0,
        retry_backoff_cap_ms: 0,
        acquire_retry_backoff_ms: 0,
        worker_lookup_backoff_ms: 0,
        poll_interval_ms: 1,
        ..Default::default()
    };
    let jobs = JobService::new(
        job_repo.clone(),
        workers.clone(),
        Arc::new(MemoryPriorityQueue::new()),
        scheduling,
    );
    let memory = Arc::new(InMemoryCoordination::new());
    let persistence = StatePersistence::new(
        snapshots.clone(),
        job_repo,
        workers.clone(),
        vectors.clone(),
        jobs.clone(),
        settings,
    )
    .with_memory(memory.clone());

    Harness {
        persistence,
        jobs,
        workers,
        snapshots,
        vectors,
        memory,
    }
}

async fn harness() -> Harness {
    harness_with(SnapshotSettings::default()).await
}

impl Harness {
    async fn worker(&self) -> Uuid {
        let worker = Worker::new(&SpawnWorkerRequest::new("snap-worker").with_capacity(3));
        self.workers.create(&worker).await.unwrap().id
    }

    async fn job(&self, priority: i32) -> Uuid {
        self.jobs
            .create_job(CreateJobRequest::new("transcode", json!({"p": priority})).with_priority(priority))
            .await
            .unwrap()
            .id
    }

    async fn job_status(&self, job_id: Uuid) -> JobStatus {
        self.jobs.get_job(job_id).await.unwrap().status
    }
}

#[tokio::test]
async fn test_full_snapshot_captures_live_state() {
    let h = harness().await;
    let worker = h.worker().await;
    let failed_worker = h.worker().await;
    h.workers.mark_failed(failed_worker).await.unwrap();

    let pending = h.job(2).await;
    let doomed = h
        .jobs
        .create_job(
            CreateJobRequest::new("transcode", json!({}))
                .with_priority(5)
                .with_max_retries(0),
        )
        .await
        .unwrap()
        .id;
    assert_eq!(h.jobs.acquire_job(worker, 1).await.unwrap(), Some(doomed));
    h.jobs.fail_job(doomed, json!({"error": "boom"})).await.unwrap();

    let snapshot = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full().with_description("before deploy"))
        .await
        .unwrap();

    assert_eq!(snapshot.worker_count, 1);
    assert_eq!(snapshot.job_count, 1);
    assert_eq!(snapshot.description.as_deref(), Some("before deploy"));
    match &snapshot.state {
        SnapshotState::V1 { workers, jobs, .. } => {
            assert_eq!(workers[0].id, worker);
            assert_eq!(jobs[0].id, pending);
        }
        other => panic!("unexpected state {:?}", other),
    }

    let indexed = h
        .vectors
        .find_by_ref(snapshot.id, VectorKind::Snapshot)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(indexed.embedding.len(), 64);
    assert_eq!(&indexed.embedding[..3], &[1.0, 1.0, 0.0]);

    let latest = h.memory.retrieve("snapshot/latest").await.unwrap();
    assert_eq!(latest["id"], json!(snapshot.id));
}

#[tokio::test]
async fn test_incremental_snapshot_requires_known_base() {
    let h = harness().await;

    let err = h
        .persistence
        .create_snapshot(CreateSnapshotRequest {
            snapshot_type: SnapshotType::Incremental,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    let err = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::incremental(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[tokio::test]
async fn test_restore_is_idempotent_and_rebuilds_queue() {
    let h = harness().await;
    let worker = h.worker().await;
    let first = h.job(5).await;
    let second = h.job(1).await;

    let snapshot = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();

    // Drift after the snapshot
    assert_eq!(h.jobs.acquire_job(worker, 1).await.unwrap(), Some(first));
    assert_eq!(h.job_status(first).await, JobStatus::Processing);

    let report = h
        .persistence
        .restore_from_snapshot(snapshot.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot_id, snapshot.id);
    assert!(report.conflicts.is_empty());
    assert_eq!(report.requeued, 1);

    let restored_first = h.jobs.get_job(first).await.unwrap();
    assert_eq!(restored_first.status, JobStatus::Pending);
    assert_eq!(restored_first.worker_id, None);
    assert!(restored_first.queued_at.is_some());
    assert_eq!(
        h.workers.find_by_id(worker).await.unwrap().unwrap().current_load,
        0
    );

    let again = h
        .persistence
        .restore_from_snapshot(snapshot.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(again.requeued, 0);
    assert_eq!(h.job_status(first).await, JobStatus::Pending);
    assert_eq!(h.job_status(second).await, JobStatus::Pending);

    let depths = h.jobs.queue_depths().await.unwrap();
    assert_eq!(depths.total(), 2);
}

#[tokio::test]
async fn test_restore_preserving_new_data_reports_conflicts() {
    let h = harness().await;
    let worker = h.worker().await;
    let snapshot = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();

    h.workers
        .mark_draining(worker, json!({"evacuation_reason": "maintenance"}))
        .await
        .unwrap();

    let report = h
        .persistence
        .restore_from_snapshot(
            snapshot.id,
            RestoreOptions {
                preserve_new_data: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        report.conflicts,
        vec![RestoreConflict {
            conflict_type: ConflictType::WorkerStatusConflict,
            entity_id: worker,
            snapshot_value: "ACTIVE".to_string(),
            current_value: "DRAINING".to_string(),
            resolution: ConflictResolution::PreservedCurrent,
        }]
    );
    let current = h.workers.find_by_id(worker).await.unwrap().unwrap();
    assert_eq!(current.status, WorkerStatus::Draining);

    let report = h
        .persistence
        .restore_from_snapshot(snapshot.id, RestoreOptions::default())
        .await
        .unwrap();
    assert!(report.conflicts.is_empty());
    let current = h.workers.find_by_id(worker).await.unwrap().unwrap();
    assert_eq!(current.status, WorkerStatus::Active);
}

#[tokio::test]
async fn test_incremental_restore_applies_base_then_delta() {
    let h = harness().await;
    let worker = h.worker().await;
    let job = h.job(3).await;

    let base = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();

    h.jobs.acquire_job(worker, 1).await.unwrap();
    h.jobs.complete_job(job, json!({"ok": true})).await.unwrap();

    let delta = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::incremental(base.id))
        .await
        .unwrap();
    assert_eq!(delta.base_snapshot_id, Some(base.id));
    assert_eq!(delta.job_count, 1);

    h.persistence
        .restore_from_snapshot(base.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(h.job_status(job).await, JobStatus::Pending);

    h.persistence
        .restore_from_snapshot(delta.id, RestoreOptions::default())
        .await
        .unwrap();
    let restored = h.jobs.get_job(job).await.unwrap();
    assert_eq!(restored.status, JobStatus::Completed);
    assert_eq!(restored.result, Some(json!({"ok": true})));
}

#[tokio::test]
async fn test_restore_rejects_inconsistent_snapshots() {
    let h = harness().await;

    let err = h
        .persistence
        .restore_from_snapshot(Uuid::new_v4(), RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    let corrupt = Snapshot {
        id: Uuid::new_v4(),
        snapshot_type: SnapshotType::Incremental,
        description: None,
        base_snapshot_id: None,
        state: SnapshotState::V1 {
            workers: Vec::new(),
            jobs: Vec::new(),
            captured_at: Utc::now(),
        },
        worker_count: 0,
        job_count: 0,
        created_at: Utc::now(),
    };
    h.snapshots.create(&corrupt).await.unwrap();

    let err = h
        .persistence
        .restore_from_snapshot(corrupt.id, RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidSnapshot(_)));
}

#[tokio::test]
async fn test_point_in_time_recovery_picks_latest_before_timestamp() {
    let h = harness().await;
    let before_any = Utc::now() - chrono::Duration::seconds(1);

    let first = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();
    let between = Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    h.persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();

    let err = h
        .persistence
        .point_in_time_recovery(before_any, RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoSnapshotAvailable(_)));

    let report = h
        .persistence
        .point_in_time_recovery(between, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot_id, first.id);
}

#[tokio::test]
async fn test_prune_auto_snapshots_respects_type() {
    let h = harness_with(SnapshotSettings {
        retention_secs: 0,
        ..Default::default()
    })
    .await;

    let auto = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::auto())
        .await
        .unwrap();
    let full = h
        .persistence
        .create_snapshot(CreateSnapshotRequest::full())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert_eq!(h.persistence.prune_auto_snapshots().await.unwrap(), 1);

    let remaining: Vec<Uuid> = h
        .persistence
        .list_snapshots()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(remaining, vec![full.id]);
    assert!(h
        .vectors
        .find_by_ref(auto.id, VectorKind::Snapshot)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_execution_context_round_trip() {
    let h = harness().await;
    let job = h.job(2).await;

    let err = h
        .persistence
        .store_execution_context(Uuid::new_v4(), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    h.persistence
        .store_execution_context(job, json!({"step": 1}))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    h.persistence
        .store_execution_context(job, json!({"step": 2}))
        .await
        .unwrap();

    let latest = h
        .persistence
        .retrieve_execution_context(job)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.job_id, job);
    assert_eq!(latest.context, json!({"step": 2}));

    assert!(h
        .persistence
        .retrieve_execution_context(Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_storing_context_again_replaces_previous_entry() {
    let h = harness().await;
    let job = h.job(2).await;
    let other = h.job(2).await;

    h.persistence
        .store_execution_context(job, json!({"task": "resize", "format": "png", "pass": 1}))
        .await
        .unwrap();
    h.persistence
        .store_execution_context(job, json!({"task": "resize", "format": "png", "pass": 2}))
        .await
        .unwrap();
    h.persistence
        .store_execution_context(other, json!({"task": "resize", "format": "png"}))
        .await
        .unwrap();

    let hits = h
        .persistence
        .search_similar_executions("resize png", 10, Some(-1.0))
        .await
        .unwrap();
    let for_job: Vec<&SimilarExecution> = hits.iter().filter(|m| m.job_id == job).collect();
    assert_eq!(for_job.len(), 1);
    assert_eq!(for_job[0].context["pass"], json!(2));
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_similarity_search_over_execution_contexts() {
    let h = harness().await;
    let resize = h.job(2).await;
    let resize_large = h.job(2).await;
    let email = h.job(2).await;

    for (job, context) in [
        (resize, json!({"task": "resize", "format": "png"})),
        (resize_large, json!({"task": "resize", "format": "png", "size": "large"})),
        (email, json!({"task": "email", "recipient": "ops"})),
    ] {
        h.persistence
            .store_execution_context(job, context)
            .await
            .unwrap();
    }

    let hits = h
        .persistence
        .search_similar_executions("resize png", 10, Some(0.5))
        .await
        .unwrap();
    let ids: Vec<Uuid> = hits.iter().map(|m| m.job_id).collect();
    assert_eq!(ids, vec![resize, resize_large]);
    assert!(hits[0].similarity >= hits[1].similarity);

    // Default threshold keeps only the closest match
    let hits = h
        .persistence
        .search_similar_executions("resize png", 10, None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].job_id, resize);

    let patterns = h
        .persistence
        .find_similar_patterns(resize, 10, Some(0.6))
        .await
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].job_id, resize_large);

    let err = h
        .persistence
        .find_similar_patterns(Uuid::new_v4(), 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}
