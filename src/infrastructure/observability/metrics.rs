// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use std::net::SocketAddr;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{info, warn};

pub const JOBS_CREATED: &str = "jobs_created_total";
pub const JOBS_ACQUIRED: &str = "jobs_acquired_total";
pub const JOBS_COMPLETED: &str = "jobs_completed_total";
pub const JOBS_FAILED: &str = "jobs_failed_total";
pub const JOBS_DEAD_LETTERED: &str = "jobs_dead_lettered_total";
pub const JOBS_PROMOTED: &str = "jobs_promoted_total";
pub const JOB_DURATION: &str = "job_duration_seconds";
pub const QUEUE_DEPTH: &str = "queue_depth";
pub const WORKER_HEALTH_SCORE: &str = "worker_health_score";
pub const SNAPSHOTS_CREATED: &str = "snapshots_created_total";

/// 初始化指标系统
///
/// 安装 Prometheus 导出器并注册应用所需的各类监控指标。
/// 端口被占用时只记录警告，指标宏在没有记录器时为空操作。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen_addr, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!(JOBS_CREATED, "Total number of jobs created");
    describe_counter!(JOBS_ACQUIRED, "Total number of jobs handed out to workers");
    describe_counter!(JOBS_COMPLETED, "Total number of jobs completed");
    describe_counter!(JOBS_FAILED, "Total number of failed job attempts");
    describe_counter!(
        JOBS_DEAD_LETTERED,
        "Total number of jobs moved to the dead letter table"
    );
    describe_counter!(JOBS_PROMOTED, "Total number of starvation promotions");
    describe_histogram!(JOB_DURATION, "Duration of completed jobs in seconds");
    describe_gauge!(QUEUE_DEPTH, "Number of queued job ids per priority tier");
    describe_gauge!(WORKER_HEALTH_SCORE, "Latest health score per worker");
    describe_counter!(SNAPSHOTS_CREATED, "Total number of state snapshots created");
}

/// 主机 CPU 采样器
pub struct CpuSampler {
    system: Mutex<System>,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
        }
    }

    /// 当前系统 CPU 使用率 (0.0 - 1.0)
    pub fn sample(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_cpu_all();
        (system.global_cpu_usage() / 100.0) as f64
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}
