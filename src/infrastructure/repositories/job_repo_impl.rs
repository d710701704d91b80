// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::job::{
    DeadLetterEntry, ExecutionStatus, Job, JobExecution, JobStatus,
};
use crate::domain::models::worker::WorkerStatus;
use crate::domain::repositories::job_repository::{
    AcquireOutcome, FailureOutcome, JobRepository, RepositoryError,
};
use crate::infrastructure::database::entities::{
    dead_letter_entry as dead_letter_entity, job as job_entity,
    job_dependency as dependency_entity, job_execution as execution_entity,
    worker as worker_entity,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// 作业仓库实现
///
/// 基于SeaORM实现的作业数据访问层。状态转换使用带条件的
/// `UPDATE ... WHERE status = ?`，以影响行数判断转换是否生效。
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的作业仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 开启修改依赖图的事务
    ///
    /// 环检测读到的边与新插入的边必须串行化，否则并发的 A->B 与 B->A
    /// 在 READ COMMITTED 下都看不到对方未提交的边。SQLite 写事务本身串行执行。
    async fn begin_graph_txn(&self) -> Result<DatabaseTransaction, RepositoryError> {
        let txn = match self.db.get_database_backend() {
            DbBackend::Sqlite => self.db.begin().await?,
            _ => {
                self.db
                    .begin_with_config(Some(IsolationLevel::Serializable), None)
                    .await?
            }
        };
        Ok(txn)
    }
}

fn to_utc(ts: DateTime<FixedOffset>) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().into()
}

impl From<job_entity::Model> for Job {
    fn from(model: job_entity::Model) -> Self {
        Self {
            id: model.id,
            job_type: model.job_type,
            payload: model.payload,
            priority: model.priority,
            status: model.status.parse().unwrap_or_default(),
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            timeout_ms: model.timeout_ms,
            worker_id: model.worker_id,
            result: model.result,
            error: model.error,
            queued_at: model.queued_at.map(to_utc),
            created_at: to_utc(model.created_at),
            started_at: model.started_at.map(to_utc),
            completed_at: model.completed_at.map(to_utc),
            updated_at: to_utc(model.updated_at),
        }
    }
}

impl From<Job> for job_entity::ActiveModel {
    fn from(job: Job) -> Self {
        Self {
            id: Set(job.id),
            job_type: Set(job.job_type),
            payload: Set(job.payload),
            priority: Set(job.priority),
            status: Set(job.status.to_string()),
            retry_count: Set(job.retry_count),
            max_retries: Set(job.max_retries),
            timeout_ms: Set(job.timeout_ms),
            worker_id: Set(job.worker_id),
            result: Set(job.result),
            error: Set(job.error),
            queued_at: Set(job.queued_at.map(Into::into)),
            created_at: Set(job.created_at.into()),
            started_at: Set(job.started_at.map(Into::into)),
            completed_at: Set(job.completed_at.map(Into::into)),
            updated_at: Set(job.updated_at.into()),
        }
    }
}

impl From<execution_entity::Model> for JobExecution {
    fn from(model: execution_entity::Model) -> Self {
        Self {
            id: model.id,
            job_id: model.job_id,
            worker_id: model.worker_id,
            attempt: model.attempt,
            status: model.status.parse().unwrap_or(ExecutionStatus::Running),
            started_at: to_utc(model.started_at),
            completed_at: model.completed_at.map(to_utc),
            duration_ms: model.duration_ms,
            error: model.error,
        }
    }
}

impl From<dead_letter_entity::Model> for DeadLetterEntry {
    fn from(model: dead_letter_entity::Model) -> Self {
        Self {
            id: model.id,
            job_id: model.job_id,
            job_type: model.job_type,
            payload: model.payload,
            retry_count: model.retry_count,
            error: model.error,
            created_at: to_utc(model.created_at),
        }
    }
}

/// 从 `start` 沿依赖边做广度优先搜索，判断是否能到达 `target`
///
/// 新边 `target -> start` 只有在 `start` 已经（间接）依赖 `target` 时才会成环
async fn reaches<C: ConnectionTrait>(
    conn: &C,
    start: Uuid,
    target: Uuid,
) -> Result<bool, RepositoryError> {
    if start == target {
        return Ok(true);
    }

    let mut visited = HashSet::from([start]);
    let mut frontier = VecDeque::from([start]);

    while !frontier.is_empty() {
        let batch: Vec<Uuid> = frontier.drain(..).collect();
        let edges = dependency_entity::Entity::find()
            .filter(dependency_entity::Column::JobId.is_in(batch))
            .all(conn)
            .await?;

        for edge in edges {
            if edge.depends_on_job_id == target {
                return Ok(true);
            }
            if visited.insert(edge.depends_on_job_id) {
                frontier.push_back(edge.depends_on_job_id);
            }
        }
    }

    Ok(false)
}

async fn insert_edge<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    depends_on: Uuid,
) -> Result<(), RepositoryError> {
    if reaches(conn, depends_on, job_id).await? {
        return Err(RepositoryError::CircularDependency {
            job_id,
            depends_on,
        });
    }

    let edge = dependency_entity::ActiveModel {
        job_id: Set(job_id),
        depends_on_job_id: Set(depends_on),
        created_at: Set(now_fixed()),
    };
    dependency_entity::Entity::insert(edge)
        .on_conflict(
            OnConflict::columns([
                dependency_entity::Column::JobId,
                dependency_entity::Column::DependsOnJobId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// 关闭作业最近一条运行中的执行记录
async fn close_open_execution<C: ConnectionTrait>(
    conn: &C,
    job_id: Uuid,
    status: ExecutionStatus,
    error: Option<serde_json::Value>,
) -> Result<(), RepositoryError> {
    let open = execution_entity::Entity::find()
        .filter(execution_entity::Column::JobId.eq(job_id))
        .filter(execution_entity::Column::Status.eq(ExecutionStatus::Running.to_string()))
        .order_by_desc(execution_entity::Column::Attempt)
        .one(conn)
        .await?;

    if let Some(open) = open {
        let now = Utc::now();
        let duration_ms = (now - to_utc(open.started_at)).num_milliseconds().max(0);
        let mut active: execution_entity::ActiveModel = open.into();
        active.status = Set(status.to_string());
        active.completed_at = Set(Some(now.into()));
        active.duration_ms = Set(Some(duration_ms));
        active.error = Set(error);
        active.update(conn).await?;
    }

    Ok(())
}

/// 节点负载减一，不低于 0
async fn release_worker_slot<C: ConnectionTrait>(
    conn: &C,
    worker_id: Uuid,
) -> Result<(), RepositoryError> {
    worker_entity::Entity::update_many()
        .col_expr(
            worker_entity::Column::CurrentLoad,
            Expr::col(worker_entity::Column::CurrentLoad).sub(1),
        )
        .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now_fixed()))
        .filter(worker_entity::Column::Id.eq(worker_id))
        .filter(worker_entity::Column::CurrentLoad.gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

async fn load_job<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<Job, RepositoryError> {
    job_entity::Entity::find_by_id(id)
        .one(conn)
        .await?
        .map(Job::from)
        .ok_or(RepositoryError::NotFound)
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create_with_dependencies(
        &self,
        job: &Job,
        depends_on: &[Uuid],
    ) -> Result<Job, RepositoryError> {
        let txn = self.begin_graph_txn().await?;

        let model: job_entity::ActiveModel = job.clone().into();
        model.insert(&txn).await?;

        for dep in depends_on {
            // Dropping the transaction on error rolls it back
            insert_edge(&txn, job.id, *dep).await?;
        }

        txn.commit().await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Job>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = job_entity::Entity::find()
            .filter(job_entity::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Job::from).collect())
    }

    async fn find_by_statuses(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, RepositoryError> {
        let models = job_entity::Entity::find()
            .filter(job_entity::Column::Status.is_in(statuses.iter().map(|s| s.to_string())))
            .all(self.db.as_ref())
            .await?;

        let mut jobs: Vec<Job> = models.into_iter().map(Job::from).collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn find_processing_by_worker(&self, worker_id: Uuid) -> Result<Vec<Job>, RepositoryError> {
        let models = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Processing.to_string()))
            .filter(job_entity::Column::WorkerId.eq(worker_id))
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Job::from).collect())
    }

    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError> {
        // Timestamps are compared in Rust so the same query works on SQLite
        let processing = self.find_by_statuses(&[JobStatus::Processing]).await?;
        Ok(processing
            .into_iter()
            .filter(|job| job.is_timed_out(now))
            .collect())
    }

    async fn find_completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Job>, RepositoryError> {
        let completed = self.find_by_statuses(&[JobStatus::Completed]).await?;
        Ok(completed
            .into_iter()
            .filter(|job| job.completed_at.is_some_and(|at| at > since))
            .collect())
    }

    async fn claim_enqueue(&self, job_id: Uuid) -> Result<bool, RepositoryError> {
        let result = job_entity::Entity::update_many()
            .col_expr(job_entity::Column::QueuedAt, Expr::value(Some(now_fixed())))
            .filter(job_entity::Column::Id.eq(job_id))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .filter(job_entity::Column::QueuedAt.is_null())
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn release_enqueue(&self, job_ids: &[Uuid]) -> Result<u64, RepositoryError> {
        if job_ids.is_empty() {
            return Ok(0);
        }

        let result = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::QueuedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .filter(job_entity::Column::Id.is_in(job_ids.to_vec()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn raise_priority(&self, job_id: Uuid, min_priority: i32) -> Result<bool, RepositoryError> {
        let result = job_entity::Entity::update_many()
            .col_expr(job_entity::Column::Priority, Expr::value(min_priority))
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now_fixed()))
            .filter(job_entity::Column::Id.eq(job_id))
            .filter(job_entity::Column::Priority.lt(min_priority))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn acquire(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
    ) -> Result<AcquireOutcome, RepositoryError> {
        let txn = self.db.begin().await?;
        let now = now_fixed();

        let claimed = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Processing.to_string()),
            )
            .col_expr(job_entity::Column::WorkerId, Expr::value(Some(worker_id)))
            .col_expr(job_entity::Column::StartedAt, Expr::value(Some(now)))
            .col_expr(
                job_entity::Column::QueuedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Id.eq(job_id))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 0 {
            let current = job_entity::Entity::find_by_id(job_id).one(&txn).await?;
            txn.rollback().await?;
            return Ok(AcquireOutcome::NotPending(
                current.and_then(|m| m.status.parse().ok()),
            ));
        }

        let reserved = worker_entity::Entity::update_many()
            .col_expr(
                worker_entity::Column::CurrentLoad,
                Expr::col(worker_entity::Column::CurrentLoad).add(1),
            )
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now))
            .filter(worker_entity::Column::Id.eq(worker_id))
            .filter(worker_entity::Column::Status.is_in([
                WorkerStatus::Active.to_string(),
                WorkerStatus::Degraded.to_string(),
            ]))
            .filter(
                Expr::col(worker_entity::Column::CurrentLoad)
                    .lt(Expr::col(worker_entity::Column::Capacity)),
            )
            .exec(&txn)
            .await?;

        if reserved.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(AcquireOutcome::WorkerUnavailable);
        }

        let previous_attempts = execution_entity::Entity::find()
            .filter(execution_entity::Column::JobId.eq(job_id))
            .count(&txn)
            .await?;

        let execution = execution_entity::ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(job_id),
            worker_id: Set(worker_id),
            attempt: Set(previous_attempts as i32 + 1),
            status: Set(ExecutionStatus::Running.to_string()),
            started_at: Set(now),
            completed_at: Set(None),
            duration_ms: Set(None),
            error: Set(None),
        };
        execution.insert(&txn).await?;

        let job = load_job(&txn, job_id).await?;
        txn.commit().await?;

        Ok(AcquireOutcome::Acquired(job))
    }

    async fn complete(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<Option<Job>, RepositoryError> {
        let txn = self.db.begin().await?;
        let existing = load_job(&txn, job_id).await?;

        if existing.status != JobStatus::Processing {
            txn.rollback().await?;
            return Ok(None);
        }

        let now = now_fixed();
        let mut update = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Completed.to_string()),
            )
            .col_expr(job_entity::Column::Result, Expr::value(result))
            .col_expr(job_entity::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Id.eq(job_id))
            .filter(job_entity::Column::Status.eq(JobStatus::Processing.to_string()));
        if let Some(worker_id) = existing.worker_id {
            update = update.filter(job_entity::Column::WorkerId.eq(worker_id));
        }

        if update.exec(&txn).await?.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        close_open_execution(&txn, job_id, ExecutionStatus::Completed, None).await?;
        if let Some(worker_id) = existing.worker_id {
            release_worker_slot(&txn, worker_id).await?;
        }

        let job = load_job(&txn, job_id).await?;
        txn.commit().await?;
        Ok(Some(job))
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error: serde_json::Value,
    ) -> Result<Option<FailureOutcome>, RepositoryError> {
        let txn = self.db.begin().await?;
        let existing = load_job(&txn, job_id).await?;

        if existing.status != JobStatus::Processing {
            txn.rollback().await?;
            return Ok(None);
        }

        let now = now_fixed();
        let retried = existing.can_retry();

        let mut update = job_entity::Entity::update_many()
            .col_expr(job_entity::Column::Error, Expr::value(error.clone()))
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Id.eq(job_id))
            .filter(job_entity::Column::Status.eq(JobStatus::Processing.to_string()))
            .filter(job_entity::Column::RetryCount.eq(existing.retry_count));

        update = if retried {
            update
                .col_expr(
                    job_entity::Column::Status,
                    Expr::value(JobStatus::Pending.to_string()),
                )
                .col_expr(
                    job_entity::Column::RetryCount,
                    Expr::value(existing.retry_count + 1),
                )
                .col_expr(job_entity::Column::WorkerId, Expr::value(Option::<Uuid>::None))
                .col_expr(
                    job_entity::Column::StartedAt,
                    Expr::value(Option::<DateTime<FixedOffset>>::None),
                )
                .col_expr(
                    job_entity::Column::QueuedAt,
                    Expr::value(Option::<DateTime<FixedOffset>>::None),
                )
        } else {
            update
                .col_expr(
                    job_entity::Column::Status,
                    Expr::value(JobStatus::Failed.to_string()),
                )
                .col_expr(job_entity::Column::CompletedAt, Expr::value(Some(now)))
        };

        if update.exec(&txn).await?.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        if !retried {
            let entry = dead_letter_entity::ActiveModel {
                id: Set(Uuid::new_v4()),
                job_id: Set(existing.id),
                job_type: Set(existing.job_type.clone()),
                payload: Set(existing.payload.clone()),
                retry_count: Set(existing.retry_count),
                error: Set(error.clone()),
                created_at: Set(now),
            };
            entry.insert(&txn).await?;
        }

        close_open_execution(&txn, job_id, ExecutionStatus::Failed, Some(error)).await?;
        if let Some(worker_id) = existing.worker_id {
            release_worker_slot(&txn, worker_id).await?;
        }

        let job = load_job(&txn, job_id).await?;
        txn.commit().await?;

        Ok(Some(FailureOutcome {
            job,
            retried,
            previous_retry_count: existing.retry_count,
            worker_id: existing.worker_id,
        }))
    }

    async fn reassign_worker_jobs(&self, worker_id: Uuid) -> Result<Vec<Job>, RepositoryError> {
        let txn = self.db.begin().await?;
        let now = now_fixed();

        let processing = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Processing.to_string()))
            .filter(job_entity::Column::WorkerId.eq(worker_id))
            .all(&txn)
            .await?;

        let mut reassigned = Vec::with_capacity(processing.len());
        for model in processing {
            let result = job_entity::Entity::update_many()
                .col_expr(
                    job_entity::Column::Status,
                    Expr::value(JobStatus::Pending.to_string()),
                )
                .col_expr(job_entity::Column::WorkerId, Expr::value(Option::<Uuid>::None))
                .col_expr(
                    job_entity::Column::StartedAt,
                    Expr::value(Option::<DateTime<FixedOffset>>::None),
                )
                .col_expr(
                    job_entity::Column::QueuedAt,
                    Expr::value(Option::<DateTime<FixedOffset>>::None),
                )
                .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
                .filter(job_entity::Column::Id.eq(model.id))
                .filter(job_entity::Column::Status.eq(JobStatus::Processing.to_string()))
                .filter(job_entity::Column::WorkerId.eq(worker_id))
                .exec(&txn)
                .await?;

            if result.rows_affected == 1 {
                close_open_execution(&txn, model.id, ExecutionStatus::Reassigned, None).await?;
                reassigned.push(model.id);
            }
        }

        worker_entity::Entity::update_many()
            .col_expr(worker_entity::Column::CurrentLoad, Expr::value(0))
            .col_expr(worker_entity::Column::UpdatedAt, Expr::value(now))
            .filter(worker_entity::Column::Id.eq(worker_id))
            .exec(&txn)
            .await?;

        let mut jobs = Vec::with_capacity(reassigned.len());
        for id in reassigned {
            jobs.push(load_job(&txn, id).await?);
        }

        txn.commit().await?;
        Ok(jobs)
    }

    async fn add_dependency(&self, job_id: Uuid, depends_on: Uuid) -> Result<(), RepositoryError> {
        let txn = self.begin_graph_txn().await?;

        for id in [job_id, depends_on] {
            if job_entity::Entity::find_by_id(id).one(&txn).await?.is_none() {
                txn.rollback().await?;
                return Err(RepositoryError::NotFound);
            }
        }

        insert_edge(&txn, job_id, depends_on).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn get_dependencies(&self, job_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let edges = dependency_entity::Entity::find()
            .filter(dependency_entity::Column::JobId.eq(job_id))
            .all(self.db.as_ref())
            .await?;

        Ok(edges.into_iter().map(|e| e.depends_on_job_id).collect())
    }

    async fn get_dependents(&self, job_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let edges = dependency_entity::Entity::find()
            .filter(dependency_entity::Column::DependsOnJobId.eq(job_id))
            .all(self.db.as_ref())
            .await?;

        Ok(edges.into_iter().map(|e| e.job_id).collect())
    }

    async fn has_unmet_dependencies(&self, job_id: Uuid) -> Result<bool, RepositoryError> {
        let deps = self.get_dependencies(job_id).await?;
        if deps.is_empty() {
            return Ok(false);
        }

        let unmet = job_entity::Entity::find()
            .filter(job_entity::Column::Id.is_in(deps))
            .filter(job_entity::Column::Status.ne(JobStatus::Completed.to_string()))
            .count(self.db.as_ref())
            .await?;

        Ok(unmet > 0)
    }

    async fn find_ready_dependents(&self, job_id: Uuid) -> Result<Vec<Job>, RepositoryError> {
        let dependents = self.get_dependents(job_id).await?;
        let candidates = self.find_many(&dependents).await?;

        let mut ready = Vec::new();
        for job in candidates {
            if job.status == JobStatus::Pending && !self.has_unmet_dependencies(job.id).await? {
                ready.push(job);
            }
        }
        Ok(ready)
    }

    async fn list_executions(&self, job_id: Uuid) -> Result<Vec<JobExecution>, RepositoryError> {
        let models = execution_entity::Entity::find()
            .filter(execution_entity::Column::JobId.eq(job_id))
            .order_by_asc(execution_entity::Column::Attempt)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(JobExecution::from).collect())
    }

    async fn recent_worker_executions(
        &self,
        worker_id: Uuid,
        limit: u64,
    ) -> Result<Vec<JobExecution>, RepositoryError> {
        let models = execution_entity::Entity::find()
            .filter(execution_entity::Column::WorkerId.eq(worker_id))
            .order_by_desc(execution_entity::Column::StartedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(JobExecution::from).collect())
    }

    async fn list_dead_letters(&self, limit: u64) -> Result<Vec<DeadLetterEntry>, RepositoryError> {
        let models = dead_letter_entity::Entity::find()
            .order_by_desc(dead_letter_entity::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(DeadLetterEntry::from).collect())
    }

    async fn upsert_many(&self, jobs: &[Job]) -> Result<u64, RepositoryError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        for job in jobs {
            let mut restored = job.clone();
            restored.queued_at = None;
            let model: job_entity::ActiveModel = restored.into();

            job_entity::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(job_entity::Column::Id)
                        .update_columns([
                            job_entity::Column::JobType,
                            job_entity::Column::Payload,
                            job_entity::Column::Priority,
                            job_entity::Column::Status,
                            job_entity::Column::RetryCount,
                            job_entity::Column::MaxRetries,
                            job_entity::Column::TimeoutMs,
                            job_entity::Column::WorkerId,
                            job_entity::Column::Result,
                            job_entity::Column::Error,
                            job_entity::Column::QueuedAt,
                            job_entity::Column::StartedAt,
                            job_entity::Column::CompletedAt,
                            job_entity::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        Ok(jobs.len() as u64)
    }
}

#[cfg(test)]
#[path = "job_repo_impl_test.rs"]
mod tests;
