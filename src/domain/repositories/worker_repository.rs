// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::worker::{HealthLogEntry, MetricType, NewHealthLog, Worker, WorkerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 工作节点仓库特质
///
/// 负载的增减由作业仓库在作业事务中完成，这里只处理注册信息和健康数据
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// 注册新节点
    async fn create(&self, worker: &Worker) -> Result<Worker, RepositoryError>;

    /// 根据ID查找节点
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Worker>, RepositoryError>;

    /// 查找所有节点
    async fn find_all(&self) -> Result<Vec<Worker>, RepositoryError>;

    /// 按状态查找节点
    async fn find_by_statuses(
        &self,
        statuses: &[WorkerStatus],
    ) -> Result<Vec<Worker>, RepositoryError>;

    /// 刷新心跳时间
    async fn touch_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// 更新健康分数
    async fn set_health_score(&self, id: Uuid, score: f64) -> Result<bool, RepositoryError>;

    /// 条件状态转换：仅当当前状态属于 `from` 时更新为 `to`
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[WorkerStatus],
        to: WorkerStatus,
    ) -> Result<bool, RepositoryError>;

    /// 标记为 DRAINING 并合并疏散元数据
    ///
    /// 节点不存在或已是 FAILED 时返回 `false`
    async fn mark_draining(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<bool, RepositoryError>;

    /// 标记为 FAILED 并累加失败次数
    async fn mark_failed(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// 追加健康日志
    async fn append_health_log(&self, log: NewHealthLog) -> Result<HealthLogEntry, RepositoryError>;

    /// 最近的健康日志，最新在前，可按指标类型过滤
    async fn recent_health_logs(
        &self,
        worker_id: Uuid,
        metric_type: Option<MetricType>,
        limit: u64,
    ) -> Result<Vec<HealthLogEntry>, RepositoryError>;

    /// 按 ID 幂等写入节点（恢复快照使用）
    async fn upsert_many(&self, workers: &[Worker]) -> Result<u64, RepositoryError>;
}
