// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SchedulingSettings;
use crate::domain::models::job::{
    CreateJobRequest, DeadLetterEntry, Job, JobExecution, JobStatus, PriorityTier, QueueDepths,
};
use crate::domain::models::worker::Worker;
use crate::domain::repositories::job_repository::{AcquireOutcome, FailureOutcome, JobRepository};
use crate::domain::repositories::worker_repository::WorkerRepository;
use crate::infrastructure::observability::metrics::{
    JOBS_ACQUIRED, JOBS_COMPLETED, JOBS_CREATED, JOBS_DEAD_LETTERED, JOBS_FAILED, JOBS_PROMOTED,
    JOB_DURATION, QUEUE_DEPTH,
};
use crate::queue::priority_queue::PriorityQueue;
use crate::utils::errors::{OrchestratorError, OrchestratorResult};
use crate::utils::retry_policy::RetryPolicy;
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// 完成作业的结果
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// 完成后的作业
    pub job: Job,
    /// 因本次完成而被激活入队的下游作业
    pub activated: Vec<Uuid>,
}

/// 作业服务
///
/// 负责作业的创建、分发、完成与失败处理。持久化状态以数据库为准，
/// 优先级队列只保存待分发的作业ID；任何提交失败都会把ID放回队列（至少一次语义）。
#[derive(Clone)]
pub struct JobService {
    /// 作业仓库
    jobs: Arc<dyn JobRepository>,
    /// 工作节点仓库
    workers: Arc<dyn WorkerRepository>,
    /// 优先级队列
    queue: Arc<dyn PriorityQueue>,
    /// 调度配置
    settings: SchedulingSettings,
    /// 失败重试退避
    retry_policy: RetryPolicy,
    /// 获取作业冲突重试退避
    acquire_backoff: RetryPolicy,
    /// 查找节点重试退避
    lookup_backoff: RetryPolicy,
    /// 延迟重新入队任务的取消令牌
    shutdown: CancellationToken,
}

impl JobService {
    /// 创建新的作业服务实例
    ///
    /// # 参数
    ///
    /// * `jobs` - 作业仓库
    /// * `workers` - 工作节点仓库
    /// * `queue` - 优先级队列
    /// * `settings` - 调度配置
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        queue: Arc<dyn PriorityQueue>,
        settings: SchedulingSettings,
    ) -> Self {
        let retry_policy =
            RetryPolicy::exponential(settings.retry_backoff_base_ms, settings.retry_backoff_cap_ms);
        let acquire_backoff = RetryPolicy::linear(settings.acquire_retry_backoff_ms);
        let lookup_backoff = RetryPolicy::linear(settings.worker_lookup_backoff_ms);

        Self {
            jobs,
            workers,
            queue,
            settings,
            retry_policy,
            acquire_backoff,
            lookup_backoff,
            shutdown: CancellationToken::new(),
        }
    }

    /// 创建作业
    ///
    /// 依赖全部完成（或没有依赖）时立即入队，否则保持 PENDING 等待级联激活
    ///
    /// # 错误
    ///
    /// * `Validation` - 请求参数不合法
    /// * `NotFound` - 依赖的作业不存在
    /// * `CircularDependency` - 依赖会形成环，事务已回滚
    #[instrument(skip(self, request), fields(job_type = %request.job_type, priority = request.priority))]
    pub async fn create_job(&self, request: CreateJobRequest) -> OrchestratorResult<Job> {
        request.validate()?;

        let mut seen = HashSet::new();
        let depends_on: Vec<Uuid> = request
            .depends_on
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let dependencies = self.jobs.find_many(&depends_on).await?;
        if dependencies.len() != depends_on.len() {
            let found: HashSet<Uuid> = dependencies.iter().map(|j| j.id).collect();
            let missing = depends_on
                .iter()
                .find(|id| !found.contains(id))
                .map(|id| id.to_string())
                .unwrap_or_default();
            return Err(OrchestratorError::NotFound(format!("dependency job {}", missing)));
        }

        let effective_priority = if request.inherit_priority {
            dependencies
                .iter()
                .map(|d| d.priority)
                .fold(request.priority, i32::max)
        } else {
            request.priority
        };

        let job = Job::new(&request, effective_priority);
        let job = self
            .jobs
            .create_with_dependencies(&job, &depends_on)
            .await
            .map_err(OrchestratorError::from_repository)?;
        counter!(JOBS_CREATED).increment(1);

        // Edges are committed, so a dependency completing from here on will cascade
        if !self.jobs.has_unmet_dependencies(job.id).await? {
            self.enqueue(&job).await?;
        } else {
            debug!("Job {} is waiting on {} dependencies", job.id, depends_on.len());
        }

        info!(
            "Created job {} with effective priority {}",
            job.id, job.priority
        );
        self.get_job(job.id).await
    }

    /// 为工作节点获取下一个作业
    ///
    /// 按高、中、低顺序轮询队列，最多等待 `timeout_seconds` 秒。
    /// 节点不存在、不可接收作业或重试耗尽时返回 `None`。
    #[instrument(skip(self))]
    pub async fn acquire_job(
        &self,
        worker_id: Uuid,
        timeout_seconds: u64,
    ) -> OrchestratorResult<Option<Uuid>> {
        let Some(worker) = self.lookup_worker(worker_id).await? else {
            warn!("Worker {} not found, cannot acquire job", worker_id);
            return Ok(None);
        };

        if !worker.can_accept_jobs() {
            debug!(
                "Worker {} is {} with load {}/{}, skipping acquisition",
                worker_id, worker.status, worker.current_load, worker.capacity
            );
            return Ok(None);
        }

        if let Err(e) = self.promote_starved().await {
            warn!("Starvation promotion failed: {}", e);
        }

        let timeout = Duration::from_secs(timeout_seconds);
        let max_attempts = self.settings.acquire_max_attempts.max(1);

        // Stale entries are dropped without using up an attempt
        let mut attempt = 0;
        while attempt < max_attempts {
            let Some((tier, job_id)) = self.pop_next(worker_id, timeout).await? else {
                return Ok(None);
            };

            match self.jobs.acquire(job_id, worker_id).await {
                Ok(AcquireOutcome::Acquired(job)) => {
                    counter!(JOBS_ACQUIRED, "tier" => tier.to_string()).increment(1);
                    info!("Worker {} acquired job {} from {} tier", worker_id, job.id, tier);
                    return Ok(Some(job.id));
                }
                Ok(AcquireOutcome::NotPending(status)) => {
                    // Stale duplicate: the job was handled elsewhere
                    debug!("Dropping stale queue entry {} (status {:?})", job_id, status);
                    self.queue.remove_in_flight(worker_id, job_id).await?;
                }
                Ok(AcquireOutcome::WorkerUnavailable) => {
                    attempt += 1;
                    warn!(
                        "Worker {} unavailable while acquiring job {} (attempt {}/{})",
                        worker_id, job_id, attempt, max_attempts
                    );
                    self.push_back(tier, worker_id, job_id).await?;
                    tokio::time::sleep(self.acquire_backoff.calculate_backoff(attempt)).await;
                }
                Err(e) => {
                    attempt += 1;
                    warn!(
                        "Acquisition of job {} failed (attempt {}/{}): {}",
                        job_id, attempt, max_attempts, e
                    );
                    self.push_back(tier, worker_id, job_id).await?;
                    tokio::time::sleep(self.acquire_backoff.calculate_backoff(attempt)).await;
                }
            }
        }

        warn!("Worker {} exhausted acquisition attempts", worker_id);
        Ok(None)
    }

    /// 完成作业并激活满足条件的下游作业
    ///
    /// 作业不处于 PROCESSING 时记录警告并返回 `None`
    #[instrument(skip(self, result))]
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> OrchestratorResult<Option<CompletionOutcome>> {
        let Some(job) = self
            .jobs
            .complete(job_id, result)
            .await
            .map_err(OrchestratorError::from_repository)?
        else {
            warn!("Job {} is not processing, ignoring completion", job_id);
            return Ok(None);
        };

        counter!(JOBS_COMPLETED).increment(1);
        if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
            let seconds = (completed - started).num_milliseconds().max(0) as f64 / 1000.0;
            histogram!(JOB_DURATION).record(seconds);
        }

        if let Some(worker_id) = job.worker_id {
            if let Err(e) = self.queue.remove_in_flight(worker_id, job_id).await {
                warn!("Failed to clear in-flight entry for job {}: {}", job_id, e);
            }
        }

        let activated = self.activate_dependents(job_id).await?;
        info!(
            "Job {} completed, activated {} dependents",
            job_id,
            activated.len()
        );

        Ok(Some(CompletionOutcome { job, activated }))
    }

    /// 作业失败
    ///
    /// 可重试时按指数退避延迟重新入队，否则写入死信，下游作业不会被触发
    #[instrument(skip(self, error))]
    pub async fn fail_job(
        &self,
        job_id: Uuid,
        error: serde_json::Value,
    ) -> OrchestratorResult<Option<FailureOutcome>> {
        let Some(outcome) = self
            .jobs
            .fail(job_id, error)
            .await
            .map_err(OrchestratorError::from_repository)?
        else {
            warn!("Job {} is not processing, ignoring failure", job_id);
            return Ok(None);
        };

        counter!(JOBS_FAILED).increment(1);
        if let Some(worker_id) = outcome.worker_id {
            if let Err(e) = self.queue.remove_in_flight(worker_id, job_id).await {
                warn!("Failed to clear in-flight entry for job {}: {}", job_id, e);
            }
        }

        if outcome.retried {
            let delay = self
                .retry_policy
                .calculate_backoff(outcome.previous_retry_count.max(0) as u32);
            info!(
                "Job {} failed, retry {}/{} in {:?}",
                job_id, outcome.job.retry_count, outcome.job.max_retries, delay
            );
            self.schedule_requeue(job_id, delay).await?;
        } else {
            counter!(JOBS_DEAD_LETTERED).increment(1);
            warn!(
                "Job {} exhausted {} retries, moved to dead letter",
                job_id, outcome.job.max_retries
            );
        }

        Ok(Some(outcome))
    }

    /// 饥饿晋升
    ///
    /// 低优先级队列中等待超过阈值的作业移入中优先级，中优先级移入高优先级，
    /// 同时把存储的优先级提升到目标层级的下限。返回晋升的作业数。
    pub async fn promote_starved(&self) -> OrchestratorResult<usize> {
        let now = Utc::now();
        let windows = [
            (PriorityTier::Low, self.settings.low_to_medium()),
            (PriorityTier::Medium, self.settings.medium_to_high()),
        ];

        let mut promoted = 0;
        for (tier, window) in windows {
            let Some((target, min_priority)) = tier.promotion_target() else {
                continue;
            };
            let window = chrono::Duration::milliseconds(window.as_millis() as i64);

            for entry in self.queue.entries(tier).await? {
                if now - entry.enqueued_at <= window {
                    continue;
                }

                if self.queue.promote(entry.job_id, tier, target).await? {
                    self.jobs.raise_priority(entry.job_id, min_priority).await?;
                    counter!(JOBS_PROMOTED, "from" => tier.to_string()).increment(1);
                    debug!("Promoted job {} from {} to {}", entry.job_id, tier, target);
                    promoted += 1;
                }
            }
        }

        if promoted > 0 {
            info!("Promoted {} starved jobs", promoted);
        }
        Ok(promoted)
    }

    /// 将超过执行超时的处理中作业按失败处理
    pub async fn enforce_timeouts(&self) -> OrchestratorResult<usize> {
        let timed_out = self.jobs.find_timed_out(Utc::now()).await?;

        let mut failed = 0;
        for job in timed_out {
            let timeout = OrchestratorError::Timeout(format!(
                "job {} exceeded {}ms",
                job.id, job.timeout_ms
            ));
            let error = serde_json::json!({
                "error": timeout.to_string(),
                "timeout_ms": job.timeout_ms,
            });
            match self.fail_job(job.id, error).await {
                Ok(Some(_)) => failed += 1,
                Ok(None) => {}
                Err(e) => error!("Failed to time out job {}: {}", job.id, e),
            }
        }

        if failed > 0 {
            warn!("Timed out {} jobs", failed);
        }
        Ok(failed)
    }

    /// 为已有作业新增依赖
    ///
    /// 若作业已在队列中且新依赖未完成，作业会被移出队列等待级联激活
    pub async fn add_dependency(&self, job_id: Uuid, depends_on: Uuid) -> OrchestratorResult<()> {
        self.jobs
            .add_dependency(job_id, depends_on)
            .await
            .map_err(OrchestratorError::from_repository)?;

        let job = self.get_job(job_id).await?;
        if job.status == JobStatus::Pending
            && job.queued_at.is_some()
            && self.jobs.has_unmet_dependencies(job_id).await?
        {
            let mut removed = false;
            for tier in PriorityTier::ALL {
                removed |= self.queue.remove(tier, job_id).await?;
            }
            if removed {
                self.jobs.release_enqueue(&[job_id]).await?;
                debug!("Job {} gated by new dependency {}", job_id, depends_on);
            }
        }

        Ok(())
    }

    /// 将节点上处理中的作业重置为 PENDING 并重新入队，返回被重新分配的作业ID
    pub async fn reassign_worker_jobs(&self, worker_id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        let jobs = self.jobs.reassign_worker_jobs(worker_id).await?;
        self.queue.clear_in_flight(worker_id).await?;

        let mut reassigned = Vec::with_capacity(jobs.len());
        for job in jobs {
            if let Err(e) = self.enqueue(&job).await {
                error!("Failed to requeue reassigned job {}: {}", job.id, e);
            }
            reassigned.push(job.id);
        }

        if !reassigned.is_empty() {
            info!("Reassigned {} jobs from worker {}", reassigned.len(), worker_id);
        }
        Ok(reassigned)
    }

    /// 重建队列
    ///
    /// 恢复快照或进程重启后，将所有无未完成依赖、且不在任何层级中的 PENDING 作业重新入队。
    /// 已在队列中的作业只补上入队标记，不会重复入队。返回新入队的作业数。
    pub async fn requeue_pending(&self) -> OrchestratorResult<usize> {
        let mut queued = HashSet::new();
        for tier in PriorityTier::ALL {
            queued.extend(self.queue.entries(tier).await?.into_iter().map(|e| e.job_id));
        }

        let pending = self.jobs.find_by_statuses(&[JobStatus::Pending]).await?;
        let mut requeued = 0;
        for job in pending {
            if queued.contains(&job.id) {
                self.jobs.claim_enqueue(job.id).await?;
                continue;
            }

            if job.queued_at.is_some() {
                self.jobs.release_enqueue(&[job.id]).await?;
            }
            if self.jobs.has_unmet_dependencies(job.id).await? {
                continue;
            }
            if self.enqueue(&job).await? {
                requeued += 1;
            }
        }

        if requeued > 0 {
            info!("Requeued {} pending jobs", requeued);
        }
        Ok(requeued)
    }

    /// 根据ID获取作业
    pub async fn get_job(&self, job_id: Uuid) -> OrchestratorResult<Job> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {}", job_id)))
    }

    /// 作业的直接依赖
    pub async fn get_dependencies(&self, job_id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        Ok(self.jobs.get_dependencies(job_id).await?)
    }

    /// 直接依赖该作业的作业
    pub async fn get_dependents(&self, job_id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        Ok(self.jobs.get_dependents(job_id).await?)
    }

    /// 作业的执行记录
    pub async fn list_executions(&self, job_id: Uuid) -> OrchestratorResult<Vec<JobExecution>> {
        Ok(self.jobs.list_executions(job_id).await?)
    }

    /// 死信列表，最新在前
    pub async fn list_dead_letters(&self, limit: u64) -> OrchestratorResult<Vec<DeadLetterEntry>> {
        Ok(self.jobs.list_dead_letters(limit).await?)
    }

    /// 各层级队列长度，同时更新队列深度指标
    pub async fn queue_depths(&self) -> OrchestratorResult<QueueDepths> {
        let depths = self.queue.depths().await?;
        gauge!(QUEUE_DEPTH, "tier" => "high").set(depths.high as f64);
        gauge!(QUEUE_DEPTH, "tier" => "medium").set(depths.medium as f64);
        gauge!(QUEUE_DEPTH, "tier" => "low").set(depths.low as f64);
        Ok(depths)
    }

    /// 取消所有等待中的延迟重新入队
    ///
    /// 被取消的作业保持 PENDING，下次 `requeue_pending` 时重新入队
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// 入队：先在数据库中声明入队标记，成功后再推入层级队列
    async fn enqueue(&self, job: &Job) -> OrchestratorResult<bool> {
        if !self.jobs.claim_enqueue(job.id).await? {
            debug!("Job {} is already queued or no longer pending", job.id);
            return Ok(false);
        }

        if let Err(e) = self.queue.push(job.tier(), job.id).await {
            if let Err(release_err) = self.jobs.release_enqueue(&[job.id]).await {
                error!("Failed to release enqueue mark for {}: {}", job.id, release_err);
            }
            return Err(e.into());
        }

        debug!("Enqueued job {} on {} tier", job.id, job.tier());
        Ok(true)
    }

    /// 依赖全部完成的下游作业入队
    async fn activate_dependents(&self, job_id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        let ready = self.jobs.find_ready_dependents(job_id).await?;

        let mut activated = Vec::with_capacity(ready.len());
        for job in ready {
            if self.enqueue(&job).await? {
                activated.push(job.id);
            }
        }
        Ok(activated)
    }

    /// 重试延迟结束后重新入队
    async fn requeue_job(&self, job_id: Uuid) -> OrchestratorResult<bool> {
        let Some(job) = self.jobs.find_by_id(job_id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending || self.jobs.has_unmet_dependencies(job_id).await? {
            return Ok(false);
        }
        self.enqueue(&job).await
    }

    async fn schedule_requeue(&self, job_id: Uuid, delay: Duration) -> OrchestratorResult<()> {
        if delay.is_zero() {
            self.requeue_job(job_id).await?;
            return Ok(());
        }

        let service = self.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Delayed requeue of job {} cancelled", job_id);
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = service.requeue_job(job_id).await {
                        error!("Failed to requeue job {}: {}", job_id, e);
                    }
                }
            }
        });
        Ok(())
    }

    /// 查找节点，未找到时按线性退避重试
    async fn lookup_worker(&self, worker_id: Uuid) -> OrchestratorResult<Option<Worker>> {
        let attempts = self.settings.worker_lookup_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(worker) = self.workers.find_by_id(worker_id).await? {
                return Ok(Some(worker));
            }
            if attempt < attempts {
                tokio::time::sleep(self.lookup_backoff.calculate_backoff(attempt)).await;
            }
        }
        Ok(None)
    }

    /// 依次轮询各层级，直到取到作业或超时
    async fn pop_next(
        &self,
        worker_id: Uuid,
        timeout: Duration,
    ) -> OrchestratorResult<Option<(PriorityTier, Uuid)>> {
        let deadline = Instant::now() + timeout;
        loop {
            for tier in PriorityTier::ALL {
                if let Some(job_id) = self.queue.pop_transfer(tier, worker_id).await? {
                    return Ok(Some((tier, job_id)));
                }
            }

            let now = Instant::now();
            if now >= deadline || self.shutdown.is_cancelled() {
                return Ok(None);
            }
            let wait = self.settings.poll_interval().min(deadline - now);
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// 放回层级队首并移出处理中列表
    async fn push_back(
        &self,
        tier: PriorityTier,
        worker_id: Uuid,
        job_id: Uuid,
    ) -> OrchestratorResult<()> {
        self.queue.requeue(tier, job_id).await?;
        self.queue.remove_in_flight(worker_id, job_id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_service_test.rs"]
mod tests;
