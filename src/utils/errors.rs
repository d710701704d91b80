// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::RepositoryError;
use crate::queue::priority_queue::QueueError;
use thiserror::Error;
use uuid::Uuid;

/// 编排服务错误类型
///
/// 服务层对外暴露的唯一错误类型，仓库与队列错误通过 `#[from]` 自动转换
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("循环依赖: 作业 {job_id} 依赖 {depends_on}")]
    CircularDependency { job_id: Uuid, depends_on: Uuid },

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("在 {0} 之前没有可用的快照")]
    NoSnapshotAvailable(String),

    #[error("无效快照: {0}")]
    InvalidSnapshot(String),

    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
}

impl OrchestratorError {
    /// 将仓库层的特定错误提升为对应的服务层错误
    pub fn from_repository(err: RepositoryError) -> Self {
        match err {
            RepositoryError::CircularDependency { job_id, depends_on } => {
                OrchestratorError::CircularDependency { job_id, depends_on }
            }
            RepositoryError::NotFound => OrchestratorError::NotFound("记录不存在".to_string()),
            RepositoryError::Conflict(msg) => OrchestratorError::ConcurrencyConflict(msg),
            other => OrchestratorError::Repository(other),
        }
    }
}

impl From<validator::ValidationErrors> for OrchestratorError {
    fn from(err: validator::ValidationErrors) -> Self {
        OrchestratorError::Validation(err.to_string())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
