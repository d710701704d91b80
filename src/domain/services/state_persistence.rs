// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SnapshotSettings;
use crate::domain::models::execution_context::{
    ExecutionContext, SimilarExecution, VectorEntry, VectorKind,
};
use crate::domain::models::job::JobStatus;
use crate::domain::models::snapshot::{
    ConflictResolution, ConflictType, CreateSnapshotRequest, RestoreConflict, RestoreOptions,
    RestoreReport, Snapshot, SnapshotState, SnapshotSummary, SnapshotType,
};
use crate::domain::models::worker::{Worker, WorkerStatus};
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::snapshot_repository::SnapshotRepository;
use crate::domain::repositories::vector_store::VectorStore;
use crate::domain::repositories::worker_repository::WorkerRepository;
use crate::domain::services::hooks::{
    pad_features, CoordinationMemory, Embedder, HashingEmbedder, InMemoryCoordination,
};
use crate::domain::services::job_service::JobService;
use crate::infrastructure::observability::metrics::SNAPSHOTS_CREATED;
use crate::utils::errors::{OrchestratorError, OrchestratorResult};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 增量快照链的最大长度
const MAX_CHAIN_DEPTH: usize = 64;

/// 状态持久化服务
///
/// 负责快照的创建与恢复、时间点恢复，以及执行上下文的存储和相似度检索。
/// 快照创建与恢复通过互斥锁串行执行，不影响作业获取。
#[derive(Clone)]
pub struct StatePersistence {
    snapshots: Arc<dyn SnapshotRepository>,
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    memory: Arc<dyn CoordinationMemory>,
    job_service: JobService,
    settings: SnapshotSettings,
    lock: Arc<Mutex<()>>,
}

impl StatePersistence {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        vectors: Arc<dyn VectorStore>,
        job_service: JobService,
        settings: SnapshotSettings,
    ) -> Self {
        Self {
            snapshots,
            jobs,
            workers,
            vectors,
            embedder: Arc::new(HashingEmbedder::new(settings.vector_dimension)),
            memory: Arc::new(InMemoryCoordination::new()),
            job_service,
            settings,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn CoordinationMemory>) -> Self {
        self.memory = memory;
        self
    }

    /// 创建快照
    ///
    /// FULL / AUTO 捕获所有未失败的节点和 PENDING、PROCESSING、COMPLETED 作业；
    /// INCREMENTAL 只记录基准快照之后完成的作业
    #[instrument(skip(self, request), fields(snapshot_type = %request.snapshot_type))]
    pub async fn create_snapshot(
        &self,
        request: CreateSnapshotRequest,
    ) -> OrchestratorResult<Snapshot> {
        let _guard = self.lock.lock().await;
        let captured_at = Utc::now();

        let (state, worker_count, job_count) = match request.snapshot_type {
            SnapshotType::Full | SnapshotType::Auto => {
                let workers: Vec<Worker> = self
                    .workers
                    .find_all()
                    .await?
                    .into_iter()
                    .filter(|w| w.status != WorkerStatus::Failed)
                    .collect();
                let jobs = self
                    .jobs
                    .find_by_statuses(&[
                        JobStatus::Pending,
                        JobStatus::Processing,
                        JobStatus::Completed,
                    ])
                    .await?;
                let counts = (workers.len() as i32, jobs.len() as i32);
                (
                    SnapshotState::V1 {
                        workers,
                        jobs,
                        captured_at,
                    },
                    counts.0,
                    counts.1,
                )
            }
            SnapshotType::Incremental => {
                let base_id = request.base_snapshot_id.ok_or_else(|| {
                    OrchestratorError::Validation(
                        "incremental snapshot requires base_snapshot_id".to_string(),
                    )
                })?;
                let base = self.snapshots.find_by_id(base_id).await?.ok_or_else(|| {
                    OrchestratorError::NotFound(format!("snapshot {}", base_id))
                })?;

                let completed_jobs = self.jobs.find_completed_since(base.created_at).await?;
                let job_count = completed_jobs.len() as i32;
                (
                    SnapshotState::Incremental {
                        base_snapshot_id: base_id,
                        completed_jobs,
                        captured_at,
                    },
                    0,
                    job_count,
                )
            }
        };

        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            snapshot_type: request.snapshot_type,
            description: request.description,
            base_snapshot_id: match request.snapshot_type {
                SnapshotType::Incremental => request.base_snapshot_id,
                _ => None,
            },
            state,
            worker_count,
            job_count,
            created_at: captured_at,
        };
        let snapshot = self.snapshots.create(&snapshot).await?;

        self.vectors
            .upsert(VectorEntry::new(
                snapshot.id,
                VectorKind::Snapshot,
                serde_json::json!({
                    "snapshot_type": snapshot.snapshot_type,
                    "worker_count": snapshot.worker_count,
                    "job_count": snapshot.job_count,
                }),
                pad_features(
                    &[snapshot.worker_count as f32, snapshot.job_count as f32],
                    self.settings.vector_dimension,
                ),
            ))
            .await?;
        self.memory
            .store(
                "snapshot/latest",
                serde_json::json!({
                    "id": snapshot.id,
                    "snapshot_type": snapshot.snapshot_type,
                    "created_at": snapshot.created_at.to_rfc3339(),
                }),
            )
            .await;

        counter!(SNAPSHOTS_CREATED, "type" => snapshot.snapshot_type.to_string()).increment(1);
        info!(
            "Created {} snapshot {} ({} workers, {} jobs)",
            snapshot.snapshot_type, snapshot.id, snapshot.worker_count, snapshot.job_count
        );
        Ok(snapshot)
    }

    /// 从快照恢复
    ///
    /// 增量快照先恢复其基准链，再依次应用增量。节点和作业按 ID 幂等写入，
    /// 重复恢复同一快照结果相同。恢复后重建丢失的队列条目。
    #[instrument(skip(self))]
    pub async fn restore_from_snapshot(
        &self,
        snapshot_id: Uuid,
        options: RestoreOptions,
    ) -> OrchestratorResult<RestoreReport> {
        let _guard = self.lock.lock().await;
        self.restore_locked(snapshot_id, options).await
    }

    /// 恢复到不晚于指定时间的最近快照
    #[instrument(skip(self))]
    pub async fn point_in_time_recovery(
        &self,
        timestamp: DateTime<Utc>,
        options: RestoreOptions,
    ) -> OrchestratorResult<RestoreReport> {
        let _guard = self.lock.lock().await;
        let snapshot = self
            .snapshots
            .find_latest_at_or_before(timestamp)
            .await?
            .ok_or_else(|| OrchestratorError::NoSnapshotAvailable(timestamp.to_rfc3339()))?;

        info!(
            "Point-in-time recovery to {} using snapshot {}",
            timestamp, snapshot.id
        );
        self.restore_locked(snapshot.id, options).await
    }

    /// 快照元数据列表，最新在前
    pub async fn list_snapshots(&self) -> OrchestratorResult<Vec<SnapshotSummary>> {
        Ok(self.snapshots.list_summaries().await?)
    }

    /// 清理超过保留期的自动快照及其向量索引
    pub async fn prune_auto_snapshots(&self) -> OrchestratorResult<usize> {
        let retention = chrono::Duration::from_std(self.settings.retention())
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - retention;

        let _guard = self.lock.lock().await;
        let removed = self
            .snapshots
            .delete_older_than(SnapshotType::Auto, cutoff)
            .await?;
        for id in &removed {
            self.vectors.delete(*id, VectorKind::Snapshot).await?;
        }

        if !removed.is_empty() {
            info!("Pruned {} automatic snapshots", removed.len());
        }
        Ok(removed.len())
    }

    /// 存储作业的执行上下文
    pub async fn store_execution_context(
        &self,
        job_id: Uuid,
        context: serde_json::Value,
    ) -> OrchestratorResult<ExecutionContext> {
        self.job_service.get_job(job_id).await?;

        let embedding = self.embed_context(&context);
        let entry = VectorEntry::new(job_id, VectorKind::ExecutionContext, context, embedding);
        self.vectors.upsert(entry.clone()).await?;
        Ok(entry.into())
    }

    /// 作业最近一次存储的执行上下文
    pub async fn retrieve_execution_context(
        &self,
        job_id: Uuid,
    ) -> OrchestratorResult<Option<ExecutionContext>> {
        Ok(self
            .vectors
            .find_by_ref(job_id, VectorKind::ExecutionContext)
            .await?
            .map(ExecutionContext::from))
    }

    /// 按自由文本检索相似的执行上下文
    pub async fn search_similar_executions(
        &self,
        query: &str,
        limit: usize,
        threshold: Option<f32>,
    ) -> OrchestratorResult<Vec<SimilarExecution>> {
        let embedding = self.embedder.embed(query);
        self.search(&embedding, None, limit, threshold).await
    }

    /// 与指定作业执行上下文相似的其他作业
    pub async fn find_similar_patterns(
        &self,
        job_id: Uuid,
        limit: usize,
        threshold: Option<f32>,
    ) -> OrchestratorResult<Vec<SimilarExecution>> {
        let reference = self
            .vectors
            .find_by_ref(job_id, VectorKind::ExecutionContext)
            .await?
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("execution context for job {}", job_id))
            })?;

        self.search(&reference.embedding, Some(job_id), limit, threshold)
            .await
    }

    async fn search(
        &self,
        embedding: &[f32],
        exclude: Option<Uuid>,
        limit: usize,
        threshold: Option<f32>,
    ) -> OrchestratorResult<Vec<SimilarExecution>> {
        let threshold = threshold.unwrap_or(self.settings.similarity_threshold);
        let matches = self
            .vectors
            .search(embedding, VectorKind::ExecutionContext, usize::MAX, threshold)
            .await?;

        Ok(matches
            .into_iter()
            .filter(|(entry, _)| Some(entry.ref_id) != exclude)
            .take(limit)
            .map(|(entry, similarity)| SimilarExecution {
                job_id: entry.ref_id,
                context: entry.content,
                similarity,
            })
            .collect())
    }

    fn embed_context(&self, context: &serde_json::Value) -> Vec<f32> {
        // Object keys serialize in sorted order
        let text = serde_json::to_string(context).unwrap_or_default();
        self.embedder.embed(&text)
    }

    async fn restore_locked(
        &self,
        snapshot_id: Uuid,
        options: RestoreOptions,
    ) -> OrchestratorResult<RestoreReport> {
        let chain = self.load_chain(snapshot_id).await?;
        let mut conflicts = Vec::new();

        // Oldest first: the full base, then each delta in order
        for snapshot in chain.iter().rev() {
            match &snapshot.state {
                SnapshotState::V1 { workers, jobs, .. } => {
                    let (to_write, mut found) = self.partition_workers(workers, options).await?;
                    conflicts.append(&mut found);
                    self.workers.upsert_many(&to_write).await?;
                    self.jobs.upsert_many(jobs).await?;
                }
                SnapshotState::Incremental { completed_jobs, .. } => {
                    self.jobs.upsert_many(completed_jobs).await?;
                }
            }
        }

        let requeued = self.job_service.requeue_pending().await?;
        if !conflicts.is_empty() {
            warn!(
                "Restore of snapshot {} preserved {} conflicting workers",
                snapshot_id,
                conflicts.len()
            );
        }
        info!(
            "Restored snapshot {} ({} snapshots applied, {} jobs requeued)",
            snapshot_id,
            chain.len(),
            requeued
        );

        Ok(RestoreReport {
            snapshot_id,
            conflicts,
            requeued,
        })
    }

    /// 加载从目标快照回溯到完整快照的链，目标在前
    async fn load_chain(&self, snapshot_id: Uuid) -> OrchestratorResult<Vec<Snapshot>> {
        let mut chain: Vec<Snapshot> = Vec::new();
        let mut next = Some(snapshot_id);

        while let Some(id) = next {
            if chain.len() >= MAX_CHAIN_DEPTH || chain.iter().any(|s| s.id == id) {
                return Err(OrchestratorError::InvalidSnapshot(format!(
                    "snapshot chain from {} does not terminate",
                    snapshot_id
                )));
            }

            let snapshot = self
                .snapshots
                .find_by_id(id)
                .await?
                .ok_or_else(|| OrchestratorError::NotFound(format!("snapshot {}", id)))?;
            next = validate_snapshot(&snapshot)?;
            chain.push(snapshot);
        }

        Ok(chain)
    }

    /// 拆分需要写入的节点和与当前数据冲突的节点
    async fn partition_workers(
        &self,
        workers: &[Worker],
        options: RestoreOptions,
    ) -> OrchestratorResult<(Vec<Worker>, Vec<RestoreConflict>)> {
        if !options.preserve_new_data {
            return Ok((workers.to_vec(), Vec::new()));
        }

        let current: HashMap<Uuid, WorkerStatus> = self
            .workers
            .find_all()
            .await?
            .into_iter()
            .map(|w| (w.id, w.status))
            .collect();

        let mut to_write = Vec::new();
        let mut conflicts = Vec::new();
        for worker in workers {
            match current.get(&worker.id) {
                Some(status) if *status != worker.status => conflicts.push(RestoreConflict {
                    conflict_type: ConflictType::WorkerStatusConflict,
                    entity_id: worker.id,
                    snapshot_value: worker.status.to_string(),
                    current_value: status.to_string(),
                    resolution: ConflictResolution::PreservedCurrent,
                }),
                _ => to_write.push(worker.clone()),
            }
        }

        Ok((to_write, conflicts))
    }
}

/// 校验快照类型与状态一致，返回增量快照的基准 ID
fn validate_snapshot(snapshot: &Snapshot) -> OrchestratorResult<Option<Uuid>> {
    match (&snapshot.snapshot_type, &snapshot.state) {
        (SnapshotType::Full | SnapshotType::Auto, SnapshotState::V1 { .. }) => Ok(None),
        (SnapshotType::Incremental, SnapshotState::Incremental { base_snapshot_id, .. })
            if snapshot.base_snapshot_id == Some(*base_snapshot_id) =>
        {
            Ok(Some(*base_snapshot_id))
        }
        _ => Err(OrchestratorError::InvalidSnapshot(format!(
            "snapshot {} state does not match its type {}",
            snapshot.id, snapshot.snapshot_type
        ))),
    }
}

#[cfg(test)]
#[path = "state_persistence_test.rs"]
mod tests;
