// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{PriorityTier, QueueDepths};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis 错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 队列中的条目无法解析
    #[error("Invalid queue entry: {0}")]
    InvalidEntry(String),
}

/// 队列条目及其进入当前层级的时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

/// 优先级队列特质
///
/// 三个先进先出的层级队列，加上每个工作节点一个处理中列表。
/// 出队与转入处理中列表是一个原子操作。
#[async_trait]
pub trait PriorityQueue: Send + Sync {
    /// 追加到层级队尾并记录入队时间
    async fn push(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError>;

    /// 放回层级队首，保留原入队时间
    async fn requeue(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError>;

    /// 从层级队首取出一个作业并原子地移入节点的处理中列表
    async fn pop_transfer(
        &self,
        tier: PriorityTier,
        worker_id: Uuid,
    ) -> Result<Option<Uuid>, QueueError>;

    /// 从节点处理中列表移除
    async fn remove_in_flight(&self, worker_id: Uuid, job_id: Uuid) -> Result<(), QueueError>;

    /// 节点处理中列表
    async fn in_flight(&self, worker_id: Uuid) -> Result<Vec<Uuid>, QueueError>;

    /// 清空节点处理中列表
    async fn clear_in_flight(&self, worker_id: Uuid) -> Result<(), QueueError>;

    /// 层级中的所有条目，按出队顺序
    async fn entries(&self, tier: PriorityTier) -> Result<Vec<QueueEntry>, QueueError>;

    /// 将作业从一个层级移到另一个层级的队尾，入队时间重置
    ///
    /// 作业已不在源层级（已被取走）时返回 `false`
    async fn promote(
        &self,
        job_id: Uuid,
        from: PriorityTier,
        to: PriorityTier,
    ) -> Result<bool, QueueError>;

    /// 从层级中删除作业
    async fn remove(&self, tier: PriorityTier, job_id: Uuid) -> Result<bool, QueueError>;

    /// 层级长度
    async fn len(&self, tier: PriorityTier) -> Result<usize, QueueError>;

    /// 所有层级长度
    async fn depths(&self) -> Result<QueueDepths, QueueError> {
        Ok(QueueDepths {
            high: self.len(PriorityTier::High).await?,
            medium: self.len(PriorityTier::Medium).await?,
            low: self.len(PriorityTier::Low).await?,
        })
    }
}
