// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::services::health_monitor::HealthMonitor;
use crate::domain::services::job_service::JobService;
use crate::domain::services::state_persistence::StatePersistence;
use crate::queue::scheduler::MaintenanceScheduler;
use crate::workers::snapshot_worker::SnapshotWorker;
use futures::future::join_all;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 后台任务管理器
///
/// 启动维护调度器和自动快照工作器，统一通过取消令牌关闭
pub struct WorkerManager {
    job_service: JobService,
    health_monitor: HealthMonitor,
    persistence: StatePersistence,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(
        job_service: JobService,
        health_monitor: HealthMonitor,
        persistence: StatePersistence,
    ) -> Self {
        Self {
            job_service,
            health_monitor,
            persistence,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// 启动所有后台任务
    pub fn start(&mut self, settings: &Settings) {
        let scheduler = MaintenanceScheduler::new(
            self.job_service.clone(),
            self.health_monitor.clone(),
            settings.scheduling.maintenance_interval(),
            Duration::from_secs_f64(settings.health.sampling_interval_secs.max(0.001)),
        );
        self.handles.push(scheduler.start(self.shutdown.child_token()));

        if settings.snapshot.auto_enabled {
            let worker =
                SnapshotWorker::new(self.persistence.clone(), settings.snapshot.auto_interval());
            self.handles.push(worker.start(self.shutdown.child_token()));
        } else {
            info!("Automatic snapshots disabled");
        }

        info!("Started {} background tasks", self.handles.len());
    }

    /// 正在运行的后台任务数
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// 等待关闭信号并关闭后台任务
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown().await;
    }

    /// 取消所有后台任务并等待退出
    pub async fn shutdown(&mut self) {
        info!("Shutting down background tasks...");
        self.shutdown.cancel();
        self.health_monitor.shutdown();
        self.job_service.shutdown();

        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        info!("Background tasks shut down successfully");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::DatabaseSettings;
    use crate::infrastructure::database::connection::{create_pool, run_migrations};
    use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
    use crate::infrastructure::repositories::memory_vector_store::MemoryVectorStore;
    use crate::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
    use crate::infrastructure::repositories::worker_repo_impl::WorkerRepositoryImpl;
    use crate::queue::memory_queue::MemoryPriorityQueue;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut settings = Settings::default();
        settings.health.sample_cpu = false;
        settings.scheduling.maintenance_interval_ms = 10;

        let db = Arc::new(create_pool(&settings.database).await.unwrap());
        run_migrations(&db).await.unwrap();
        let jobs = Arc::new(JobRepositoryImpl::new(db.clone()));
        let workers = Arc::new(WorkerRepositoryImpl::new(db.clone()));
        let job_service = JobService::new(
            jobs.clone(),
            workers.clone(),
            Arc::new(MemoryPriorityQueue::new()),
            settings.scheduling.clone(),
        );
        let monitor = HealthMonitor::new(
            workers.clone(),
            jobs.clone(),
            job_service.clone(),
            settings.health.clone(),
        );
        let persistence = StatePersistence::new(
            Arc::new(SnapshotRepositoryImpl::new(db)),
            jobs,
            workers,
            Arc::new(MemoryVectorStore::new()),
            job_service.clone(),
            settings.snapshot.clone(),
        );

        let mut manager = WorkerManager::new(job_service, monitor, persistence);
        manager.start(&settings);
        assert_eq!(manager.task_count(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(2), manager.shutdown())
            .await
            .expect("background tasks did not stop");
        assert_eq!(manager.task_count(), 0);
    }
}
