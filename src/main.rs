// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use orchestrs::config::settings::{QueueBackend, Settings};
use orchestrs::domain::repositories::vector_store::VectorStore;
use orchestrs::domain::services::health_monitor::HealthMonitor;
use orchestrs::domain::services::hooks::InMemoryCoordination;
use orchestrs::domain::services::job_service::JobService;
use orchestrs::domain::services::state_persistence::StatePersistence;
use orchestrs::infrastructure::cache::redis_client::RedisClient;
use orchestrs::infrastructure::cache::redis_queue::RedisPriorityQueue;
use orchestrs::infrastructure::database::connection;
use orchestrs::infrastructure::observability::metrics::init_metrics;
use orchestrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use orchestrs::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
use orchestrs::infrastructure::repositories::vector_store_impl::VectorStoreImpl;
use orchestrs::infrastructure::repositories::worker_repo_impl::WorkerRepositoryImpl;
use orchestrs::queue::memory_queue::MemoryPriorityQueue;
use orchestrs::queue::priority_queue::PriorityQueue;
use orchestrs::utils::telemetry;
use orchestrs::workers::WorkerManager;
use std::sync::Arc;
use tracing::info;

/// 主函数
///
/// 初始化存储、队列和各领域服务，重建队列后运行后台任务直到收到关闭信号
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting orchestrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    init_metrics(&settings.metrics);

    // 3. Connect to database and apply migrations
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");
    connection::run_migrations(&db).await?;

    // 4. Priority queue backend
    let queue: Arc<dyn PriorityQueue> = match settings.queue.backend {
        QueueBackend::Redis => {
            let client = RedisClient::new(&settings.redis.url).await?;
            info!("Redis priority queue initialized");
            Arc::new(RedisPriorityQueue::new(
                client,
                settings.queue.key_prefix.clone(),
            ))
        }
        QueueBackend::Memory => {
            info!("Using in-process priority queue");
            Arc::new(MemoryPriorityQueue::new())
        }
    };

    // 5. Services
    let jobs = Arc::new(JobRepositoryImpl::new(db.clone()));
    let workers = Arc::new(WorkerRepositoryImpl::new(db.clone()));
    let snapshots = Arc::new(SnapshotRepositoryImpl::new(db.clone()));
    let vectors: Arc<dyn VectorStore> = Arc::new(VectorStoreImpl::new(db.clone()));
    let memory = Arc::new(InMemoryCoordination::new());

    let job_service = JobService::new(
        jobs.clone(),
        workers.clone(),
        queue,
        settings.scheduling.clone(),
    );
    let health_monitor = HealthMonitor::new(
        workers.clone(),
        jobs.clone(),
        job_service.clone(),
        settings.health.clone(),
    )
    .with_memory(memory.clone());
    let persistence = StatePersistence::new(
        snapshots,
        jobs,
        workers,
        vectors,
        job_service.clone(),
        settings.snapshot.clone(),
    )
    .with_memory(memory);

    // 6. Rebuild queue entries lost with the previous process
    let requeued = job_service.requeue_pending().await?;
    info!("Queue rebuilt ({} jobs requeued)", requeued);

    // 7. Background tasks
    let mut manager = WorkerManager::new(job_service, health_monitor, persistence);
    manager.start(&settings);

    manager.wait_for_shutdown().await;
    info!("orchestrs stopped");
    Ok(())
}
