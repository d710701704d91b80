// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::snapshot::{Snapshot, SnapshotSummary, SnapshotType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 快照仓库特质
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// 保存快照
    async fn create(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError>;

    /// 根据ID查找快照
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Snapshot>, RepositoryError>;

    /// 最近一个创建时间不晚于 `at` 的快照
    async fn find_latest_at_or_before(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, RepositoryError>;

    /// 快照元数据列表，最新在前
    async fn list_summaries(&self) -> Result<Vec<SnapshotSummary>, RepositoryError>;

    /// 删除指定类型中早于 `cutoff` 的快照，返回被删除的 ID
    async fn delete_older_than(
        &self,
        snapshot_type: SnapshotType,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, RepositoryError>;
}
