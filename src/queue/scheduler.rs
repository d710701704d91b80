// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::services::health_monitor::HealthMonitor;
use crate::domain::services::job_service::JobService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 单次维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// 被提升优先级的作业数
    pub promoted: usize,
    /// 因超时失败的作业数
    pub timed_out: usize,
    /// 因心跳丢失被标记失败的节点数
    pub failed_workers: usize,
}

/// 维护调度器
///
/// 定期执行饥饿作业提升、超时作业处理，并按采样间隔刷新节点健康分数。
/// 每轮的错误只记录日志，不会终止调度器。
pub struct MaintenanceScheduler {
    job_service: JobService,
    health_monitor: HealthMonitor,
    tick: Duration,
    health_interval: Duration,
    last_health_refresh: Option<Instant>,
}

impl MaintenanceScheduler {
    pub fn new(
        job_service: JobService,
        health_monitor: HealthMonitor,
        tick: Duration,
        health_interval: Duration,
    ) -> Self {
        Self {
            job_service,
            health_monitor,
            tick,
            health_interval,
            last_health_refresh: None,
        }
    }

    /// 启动后台任务，令牌取消后退出
    pub fn start(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Maintenance scheduler started (tick {:?})", self.tick);

            let mut ticker = interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }

            info!("Maintenance scheduler stopped");
        })
    }

    /// 执行一轮维护
    pub async fn run_once(&mut self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.job_service.promote_starved().await {
            Ok(count) => report.promoted = count,
            Err(e) => error!("Failed to promote starved jobs: {}", e),
        }

        match self.job_service.enforce_timeouts().await {
            Ok(count) => report.timed_out = count,
            Err(e) => error!("Failed to enforce job timeouts: {}", e),
        }

        let refresh_due = self
            .last_health_refresh
            .map_or(true, |at| at.elapsed() >= self.health_interval);
        if refresh_due {
            self.last_health_refresh = Some(Instant::now());
            match self.health_monitor.refresh_health_scores().await {
                Ok(count) => report.failed_workers = count,
                Err(e) => error!("Failed to refresh worker health: {}", e),
            }
        }

        if let Err(e) = self.job_service.queue_depths().await {
            error!("Failed to read queue depths: {}", e);
        }

        if report != MaintenanceReport::default() {
            info!(
                "Maintenance: {} promoted, {} timed out, {} workers failed",
                report.promoted, report.timed_out, report.failed_workers
            );
        } else {
            debug!("Maintenance tick");
        }
        report
    }
}
