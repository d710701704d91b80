// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::snapshot::{Snapshot, SnapshotState, SnapshotSummary, SnapshotType};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::snapshot_repository::SnapshotRepository;
use crate::infrastructure::database::entities::snapshot as snapshot_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect,
    Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 快照仓库实现
///
/// 时间比较在内存中完成：先只取元数据列，再按需加载完整状态
#[derive(Clone)]
pub struct SnapshotRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl SnapshotRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn summaries(&self) -> Result<Vec<SnapshotSummary>, RepositoryError> {
        let rows: Vec<(Uuid, String, DateTime<FixedOffset>)> = snapshot_entity::Entity::find()
            .select_only()
            .columns([
                snapshot_entity::Column::Id,
                snapshot_entity::Column::SnapshotType,
                snapshot_entity::Column::CreatedAt,
            ])
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        let mut summaries: Vec<SnapshotSummary> = rows
            .into_iter()
            .map(|(id, snapshot_type, created_at)| SnapshotSummary {
                id,
                snapshot_type: snapshot_type.parse().unwrap_or_default(),
                created_at: created_at.with_timezone(&Utc),
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

impl TryFrom<snapshot_entity::Model> for Snapshot {
    type Error = RepositoryError;

    fn try_from(model: snapshot_entity::Model) -> Result<Self, Self::Error> {
        let state: SnapshotState = serde_json::from_value(model.state)?;
        Ok(Self {
            id: model.id,
            snapshot_type: model.snapshot_type.parse().unwrap_or_default(),
            description: model.description,
            base_snapshot_id: model.base_snapshot_id,
            state,
            worker_count: model.worker_count,
            job_count: model.job_count,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl SnapshotRepository for SnapshotRepositoryImpl {
    async fn create(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError> {
        let model = snapshot_entity::ActiveModel {
            id: Set(snapshot.id),
            snapshot_type: Set(snapshot.snapshot_type.to_string()),
            description: Set(snapshot.description.clone()),
            base_snapshot_id: Set(snapshot.base_snapshot_id),
            state: Set(serde_json::to_value(&snapshot.state)?),
            worker_count: Set(snapshot.worker_count),
            job_count: Set(snapshot.job_count),
            created_at: Set(snapshot.created_at.into()),
        };

        model.insert(self.db.as_ref()).await?;
        Ok(snapshot.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Snapshot>, RepositoryError> {
        let model = snapshot_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        model.map(Snapshot::try_from).transpose()
    }

    async fn find_latest_at_or_before(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, RepositoryError> {
        let latest = self
            .summaries()
            .await?
            .into_iter()
            .find(|s| s.created_at <= at);

        match latest {
            Some(summary) => self.find_by_id(summary.id).await,
            None => Ok(None),
        }
    }

    async fn list_summaries(&self) -> Result<Vec<SnapshotSummary>, RepositoryError> {
        self.summaries().await
    }

    async fn delete_older_than(
        &self,
        snapshot_type: SnapshotType,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let expired: Vec<Uuid> = self
            .summaries()
            .await?
            .into_iter()
            .filter(|s| s.snapshot_type == snapshot_type && s.created_at < cutoff)
            .map(|s| s.id)
            .collect();

        if !expired.is_empty() {
            snapshot_entity::Entity::delete_many()
                .filter(snapshot_entity::Column::Id.is_in(expired.clone()))
                .exec(self.db.as_ref())
                .await?;
        }

        Ok(expired)
    }
}
