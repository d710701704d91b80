// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{DeadLetterEntry, Job, JobExecution, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 新增依赖边会形成环
    #[error("Dependency {job_id} -> {depends_on} would create a cycle")]
    CircularDependency { job_id: Uuid, depends_on: Uuid },
    /// JSON 列序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 持久化的值无法解析为领域类型
    #[error("Decode error: {0}")]
    Decode(String),
    /// 并发更新冲突
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// 获取作业事务的结果
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// 作业已转为 PROCESSING
    Acquired(Job),
    /// 作业不处于 PENDING（已被处理或已终结），携带当前状态
    NotPending(Option<JobStatus>),
    /// 工作节点不存在或已满载，事务已回滚
    WorkerUnavailable,
}

/// 失败处理结果
#[derive(Debug, Clone)]
pub struct FailureOutcome {
    /// 更新后的作业
    pub job: Job,
    /// 是否已安排重试（否则进入死信）
    pub retried: bool,
    /// 本次失败前的重试次数，用于计算退避
    pub previous_retry_count: i32,
    /// 释放的工作节点
    pub worker_id: Option<Uuid>,
}

/// 作业仓库特质
///
/// 定义作业、依赖边、执行记录和死信的数据访问接口。
/// 所有涉及多表的状态转换都在单个事务中完成。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 在一个事务内创建作业及其依赖边，形成环时整体回滚
    async fn create_with_dependencies(
        &self,
        job: &Job,
        depends_on: &[Uuid],
    ) -> Result<Job, RepositoryError>;

    /// 根据ID查找作业
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// 批量查找作业
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, RepositoryError>;

    /// 按状态查找作业
    async fn find_by_statuses(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, RepositoryError>;

    /// 查找某个节点上处理中的作业
    async fn find_processing_by_worker(&self, worker_id: Uuid) -> Result<Vec<Job>, RepositoryError>;

    /// 查找已超过执行超时的处理中作业
    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError>;

    /// 查找指定时间之后完成的作业
    async fn find_completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Job>, RepositoryError>;

    /// 标记作业已入队
    ///
    /// 仅当作业处于 PENDING 且尚未入队时成功，保证同一作业不会重复入队
    async fn claim_enqueue(&self, job_id: Uuid) -> Result<bool, RepositoryError>;

    /// 清除入队标记，用于入队失败或队列丢失后的重建
    async fn release_enqueue(&self, job_ids: &[Uuid]) -> Result<u64, RepositoryError>;

    /// 提升作业优先级（只升不降）
    async fn raise_priority(&self, job_id: Uuid, min_priority: i32) -> Result<bool, RepositoryError>;

    /// 获取作业：PENDING → PROCESSING，写入执行记录并增加节点负载
    async fn acquire(&self, job_id: Uuid, worker_id: Uuid)
        -> Result<AcquireOutcome, RepositoryError>;

    /// 完成作业：PROCESSING → COMPLETED，作业不在处理中时返回 `None`
    async fn complete(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<Option<Job>, RepositoryError>;

    /// 作业失败：可重试时回到 PENDING，否则标记 FAILED 并写入死信
    async fn fail(
        &self,
        job_id: Uuid,
        error: serde_json::Value,
    ) -> Result<Option<FailureOutcome>, RepositoryError>;

    /// 将节点上所有处理中的作业重置为 PENDING，并清零节点负载
    async fn reassign_worker_jobs(&self, worker_id: Uuid) -> Result<Vec<Job>, RepositoryError>;

    /// 新增依赖边（带环检测）
    async fn add_dependency(&self, job_id: Uuid, depends_on: Uuid) -> Result<(), RepositoryError>;

    /// 作业的直接依赖
    async fn get_dependencies(&self, job_id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;

    /// 直接依赖该作业的作业
    async fn get_dependents(&self, job_id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;

    /// 作业是否还有未完成的依赖
    async fn has_unmet_dependencies(&self, job_id: Uuid) -> Result<bool, RepositoryError>;

    /// 依赖全部完成且仍处于 PENDING 的直接下游作业
    async fn find_ready_dependents(&self, job_id: Uuid) -> Result<Vec<Job>, RepositoryError>;

    /// 作业的执行记录，按尝试次数升序
    async fn list_executions(&self, job_id: Uuid) -> Result<Vec<JobExecution>, RepositoryError>;

    /// 节点最近的执行记录，最新在前
    async fn recent_worker_executions(
        &self,
        worker_id: Uuid,
        limit: u64,
    ) -> Result<Vec<JobExecution>, RepositoryError>;

    /// 死信列表，最新在前
    async fn list_dead_letters(&self, limit: u64) -> Result<Vec<DeadLetterEntry>, RepositoryError>;

    /// 按 ID 幂等写入作业（恢复快照使用），入队标记被清除
    async fn upsert_many(&self, jobs: &[Job]) -> Result<u64, RepositoryError>;
}
