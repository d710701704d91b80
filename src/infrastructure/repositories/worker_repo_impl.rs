// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::worker::{
    HealthLogEntry, MetricType, NewHealthLog, Worker, WorkerStatus,
};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::worker_repository::WorkerRepository;
use crate::infrastructure::database::entities::{health_log, worker as worker_entity};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 工作节点仓库实现
#[derive(Clone)]
pub struct WorkerRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl WorkerRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().into()
}

impl From<worker_entity::Model> for Worker {
    fn from(model: worker_entity::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            worker_type: model.worker_type,
            status: model.status.parse().unwrap_or_default(),
            capacity: model.capacity,
            current_load: model.current_load,
            health_score: model.health_score,
            last_heartbeat: model.last_heartbeat.with_timezone(&Utc),
            failure_count: model.failure_count,
            capabilities: serde_json::from_value(model.capabilities).unwrap_or_default(),
            metadata: model.metadata,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl TryFrom<&Worker> for worker_entity::ActiveModel {
    type Error = RepositoryError;

    fn try_from(worker: &Worker) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Set(worker.id),
            name: Set(worker.name.clone()),
            worker_type: Set(worker.worker_type.clone()),
            status: Set(worker.status.to_string()),
            capacity: Set(worker.capacity),
            current_load: Set(worker.current_load),
            health_score: Set(worker.health_score),
            last_heartbeat: Set(worker.last_heartbeat.into()),
            failure_count: Set(worker.failure_count),
            capabilities: Set(serde_json::to_value(&worker.capabilities)?),
            metadata: Set(worker.metadata.clone()),
            created_at: Set(worker.created_at.into()),
            updated_at: Set(worker.updated_at.into()),
        })
    }
}

impl From<health_log::Model> for HealthLogEntry {
    fn from(model: health_log::Model) -> Self {
        Self {
            id: model.id,
            worker_id: model.worker_id,
            metric_type: model.metric_type.parse().unwrap_or(MetricType::Alert),
            value: model.value,
            details: model.details,
            recorded_at: model.recorded_at.with_timezone(&Utc),
        }
    }
}

#[async_trait]
impl WorkerRepository for WorkerRepositoryImpl {
    async fn create(&self, worker: &Worker) -> Result<Worker, RepositoryError> {
        let model = worker_entity::ActiveModel::try_from(worker)?;
        let inserted = model.insert(self.db.as_ref()).await?;
        Ok(inserted.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Worker>, RepositoryError> {
        let model = worker_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_all(&self) -> Result<Vec<Worker>, RepositoryError> {
        let models = worker_entity::Entity::find()
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Worker::from).collect())
    }

    async fn find_by_statuses(
        &self,
        statuses: &[WorkerStatus],
    ) -> Result<Vec<Worker>, RepositoryError> {
        let models = worker_entity::Entity::find()
            .filter(worker_entity::Column::Status.is_in(statuses.iter().map(|s| s.to_string())))
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Worker::from).collect())
    }

    async fn touch_heartbeat(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let at: DateTime<FixedOffset> = at.into();
        let result = worker_entity::Entity::update_many()
            .col_expr(worker_entity::Column::LastHeartbeat, Expr::value(at))
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(at))
            .filter(worker_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn set_health_score(&self, id: Uuid, score: f64) -> Result<bool, RepositoryError> {
        let result = worker_entity::Entity::update_many()
            .col_expr(worker_entity::Column::HealthScore, Expr::value(score))
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now_fixed()))
            .filter(worker_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[WorkerStatus],
        to: WorkerStatus,
    ) -> Result<bool, RepositoryError> {
        let result = worker_entity::Entity::update_many()
            .col_expr(worker_entity::Column::Status, Expr::value(to.to_string()))
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now_fixed()))
            .filter(worker_entity::Column::Id.eq(id))
            .filter(worker_entity::Column::Status.is_in(from.iter().map(|s| s.to_string())))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_draining(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let model = worker_entity::Entity::find_by_id(id)
            .filter(worker_entity::Column::Status.ne(WorkerStatus::Failed.to_string()))
            .one(&txn)
            .await?;
        let Some(model) = model else {
            txn.rollback().await?;
            return Ok(false);
        };

        let mut merged = match model.metadata.clone() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let serde_json::Value::Object(extra) = metadata {
            merged.extend(extra);
        }

        let mut active: worker_entity::ActiveModel = model.into();
        active.status = Set(WorkerStatus::Draining.to_string());
        active.metadata = Set(serde_json::Value::Object(merged));
        active.updated_at = Set(now_fixed());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn mark_failed(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = worker_entity::Entity::update_many()
            .col_expr(
                worker_entity::Column::Status,
                Expr::value(WorkerStatus::Failed.to_string()),
            )
            .col_expr(
                worker_entity::Column::FailureCount,
                Expr::col(worker_entity::Column::FailureCount).add(1),
            )
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now_fixed()))
            .filter(worker_entity::Column::Id.eq(id))
            .filter(worker_entity::Column::Status.ne(WorkerStatus::Failed.to_string()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn append_health_log(&self, log: NewHealthLog) -> Result<HealthLogEntry, RepositoryError> {
        let model = health_log::ActiveModel {
            worker_id: Set(log.worker_id),
            metric_type: Set(log.metric_type.to_string()),
            value: Set(log.value),
            details: Set(log.details),
            recorded_at: Set(now_fixed()),
            ..Default::default()
        };

        let inserted = model.insert(self.db.as_ref()).await?;
        Ok(inserted.into())
    }

    async fn recent_health_logs(
        &self,
        worker_id: Uuid,
        metric_type: Option<MetricType>,
        limit: u64,
    ) -> Result<Vec<HealthLogEntry>, RepositoryError> {
        let mut query = health_log::Entity::find()
            .filter(health_log::Column::WorkerId.eq(worker_id));
        if let Some(metric_type) = metric_type {
            query = query.filter(health_log::Column::MetricType.eq(metric_type.to_string()));
        }

        // The auto-increment id is the append order
        let models = query
            .order_by_desc(health_log::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(HealthLogEntry::from).collect())
    }

    async fn upsert_many(&self, workers: &[Worker]) -> Result<u64, RepositoryError> {
        if workers.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        for worker in workers {
            let model = worker_entity::ActiveModel::try_from(worker)?;
            worker_entity::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(worker_entity::Column::Id)
                        .update_columns([
                            worker_entity::Column::Name,
                            worker_entity::Column::WorkerType,
                            worker_entity::Column::Status,
                            worker_entity::Column::Capacity,
                            worker_entity::Column::CurrentLoad,
                            worker_entity::Column::HealthScore,
                            worker_entity::Column::LastHeartbeat,
                            worker_entity::Column::FailureCount,
                            worker_entity::Column::Capabilities,
                            worker_entity::Column::Metadata,
                            worker_entity::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        Ok(workers.len() as u64)
    }
}
