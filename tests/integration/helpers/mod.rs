// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use orchestrs::config::settings::{
    DatabaseSettings, HealthSettings, SchedulingSettings, SnapshotSettings,
};
use orchestrs::domain::models::worker::{SpawnWorkerRequest, Worker};
use orchestrs::domain::repositories::worker_repository::WorkerRepository;
use orchestrs::domain::services::health_monitor::HealthMonitor;
use orchestrs::domain::services::job_service::JobService;
use orchestrs::domain::services::state_persistence::StatePersistence;
use orchestrs::infrastructure::database::connection;
use orchestrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use orchestrs::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
use orchestrs::infrastructure::repositories::vector_store_impl::VectorStoreImpl;
use orchestrs::infrastructure::repositories::worker_repo_impl::WorkerRepositoryImpl;
use orchestrs::queue::memory_queue::MemoryPriorityQueue;
use orchestrs::domain::models::job::PriorityTier;
use orchestrs::queue::priority_queue::PriorityQueue;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

/// 一组共享同一数据库和队列的服务
#[allow(dead_code)]
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub queue: Arc<MemoryPriorityQueue>,
    pub workers: Arc<WorkerRepositoryImpl>,
    pub jobs: JobService,
    pub monitor: HealthMonitor,
    pub persistence: StatePersistence,
}

pub fn fast_scheduling() -> SchedulingSettings {
    SchedulingSettings {
        retry_backoff_base_ms: 0,
        retry_backoff_cap_ms: 0,
        acquire_retry_backoff_ms: 0,
        worker_lookup_backoff_ms: 0,
        poll_interval_ms: 1,
        ..Default::default()
    }
}

pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = connection::create_pool(&DatabaseSettings::default())
        .await
        .expect("Failed to create database");
    connection::run_migrations(&db)
        .await
        .expect("Failed to run migrations");
    Arc::new(db)
}

pub async fn create_test_app() -> TestApp {
    let db = create_test_db().await;
    build_app(db, Arc::new(MemoryPriorityQueue::new()))
}

/// 在已有数据库上构建新的服务实例，模拟进程重启后队列丢失
pub fn build_app(db: Arc<DatabaseConnection>, queue: Arc<MemoryPriorityQueue>) -> TestApp {
    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let workers = Arc::new(WorkerRepositoryImpl::new(db.clone()));

    let jobs = JobService::new(
        job_repo.clone(),
        workers.clone(),
        queue.clone(),
        fast_scheduling(),
    );
    let monitor = HealthMonitor::new(
        workers.clone(),
        job_repo.clone(),
        jobs.clone(),
        HealthSettings {
            sample_cpu: false,
            ..Default::default()
        },
    );
    let persistence = StatePersistence::new(
        Arc::new(SnapshotRepositoryImpl::new(db.clone())),
        job_repo,
        workers.clone(),
        Arc::new(VectorStoreImpl::new(db.clone())),
        jobs.clone(),
        SnapshotSettings::default(),
    );

    TestApp {
        db,
        queue,
        workers,
        jobs,
        monitor,
        persistence,
    }
}

#[allow(dead_code)]
impl TestApp {
    /// 注册一个不启动心跳任务的工作节点
    pub async fn register_worker(&self, name: &str, capacity: i32) -> Uuid {
        let worker = Worker::new(&SpawnWorkerRequest::new(name).with_capacity(capacity));
        self.workers
            .create(&worker)
            .await
            .expect("Failed to create worker")
            .id
    }

    pub async fn tier_ids(&self, tier: PriorityTier) -> Vec<Uuid> {
        self.queue
            .entries(tier)
            .await
            .expect("Failed to read queue")
            .into_iter()
            .map(|e| e.job_id)
            .collect()
    }
}
