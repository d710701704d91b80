// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::snapshot::CreateSnapshotRequest;
use crate::domain::services::state_persistence::StatePersistence;
use crate::utils::errors::OrchestratorResult;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// 自动快照工作器
///
/// 按固定间隔创建 AUTO 快照，并清理超过保留期的旧自动快照
pub struct SnapshotWorker {
    persistence: StatePersistence,
    interval: Duration,
}

impl SnapshotWorker {
    pub fn new(persistence: StatePersistence, interval: Duration) -> Self {
        Self {
            persistence,
            interval,
        }
    }

    /// 运行工作器直到令牌取消
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Snapshot worker started (interval {:?})", self.interval);

        // The first tick would fire immediately
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Automatic snapshot failed: {}", e);
                    }
                }
            }
        }

        info!("Snapshot worker stopped");
    }

    /// 启动后台运行
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// 创建一个自动快照并清理过期快照，返回新快照ID
    pub async fn run_once(&self) -> OrchestratorResult<Uuid> {
        let snapshot = self
            .persistence
            .create_snapshot(CreateSnapshotRequest::auto())
            .await?;

        let pruned = self.persistence.prune_auto_snapshots().await?;
        if pruned > 0 {
            info!("Pruned {} expired automatic snapshots", pruned);
        }
        Ok(snapshot.id)
    }
}

#[cfg(test)]
#[path = "snapshot_worker_test.rs"]
mod tests;
