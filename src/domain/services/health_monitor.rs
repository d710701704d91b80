// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::HealthSettings;
use crate::domain::models::job::ExecutionStatus;
use crate::domain::models::worker::{
    Anomaly, FailurePrediction, MetricType, NewHealthLog, OptimalWorkerCriteria,
    RecommendedAction, SpawnWorkerRequest, Worker, WorkerHealth, WorkerStatus,
};
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::worker_repository::WorkerRepository;
use crate::domain::services::hooks::{
    CoordinationMemory, FailurePredictor, InMemoryCoordination, StatisticalPredictor,
};
use crate::domain::services::job_service::JobService;
use crate::infrastructure::observability::metrics::{CpuSampler, WORKER_HEALTH_SCORE};
use crate::utils::errors::{OrchestratorError, OrchestratorResult};
use chrono::Utc;
use dashmap::DashMap;
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// 健康监控服务
///
/// 管理工作节点注册与心跳、健康分数、失败预测、异常检测和疏散
#[derive(Clone)]
pub struct HealthMonitor {
    workers: Arc<dyn WorkerRepository>,
    jobs: Arc<dyn JobRepository>,
    job_service: JobService,
    predictor: Arc<dyn FailurePredictor>,
    memory: Arc<dyn CoordinationMemory>,
    cpu: Arc<CpuSampler>,
    settings: HealthSettings,
    /// 每个节点心跳任务的取消令牌
    heartbeats: Arc<DashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        jobs: Arc<dyn JobRepository>,
        job_service: JobService,
        settings: HealthSettings,
    ) -> Self {
        Self {
            workers,
            jobs,
            job_service,
            predictor: Arc::new(StatisticalPredictor),
            memory: Arc::new(InMemoryCoordination::new()),
            cpu: Arc::new(CpuSampler::new()),
            settings,
            heartbeats: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// 替换失败预测钩子
    pub fn with_predictor(mut self, predictor: Arc<dyn FailurePredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    /// 替换协调内存
    pub fn with_memory(mut self, memory: Arc<dyn CoordinationMemory>) -> Self {
        self.memory = memory;
        self
    }

    /// 注册工作节点并启动心跳任务
    #[instrument(skip(self, request), fields(name = %request.name, worker_type = %request.worker_type))]
    pub async fn spawn_worker(&self, request: SpawnWorkerRequest) -> OrchestratorResult<Worker> {
        request.validate()?;

        let worker = self.workers.create(&Worker::new(&request)).await?;
        gauge!(WORKER_HEALTH_SCORE, "worker_id" => worker.id.to_string()).set(worker.health_score);

        self.start_heartbeat(worker.id, Duration::from_millis(request.heartbeat_interval_ms));
        info!(
            "Spawned worker {} ({}) with capacity {}",
            worker.id, worker.worker_type, worker.capacity
        );
        Ok(worker)
    }

    /// 记录一次心跳
    ///
    /// 刷新心跳时间并写入 `heartbeat` 日志（值为当前负载），启用时同时采样主机 CPU
    pub async fn heartbeat(&self, worker_id: Uuid) -> OrchestratorResult<()> {
        if !self.workers.touch_heartbeat(worker_id, Utc::now()).await? {
            return Err(OrchestratorError::NotFound(format!("worker {}", worker_id)));
        }

        let load = self
            .workers
            .find_by_id(worker_id)
            .await?
            .map(|w| w.current_load)
            .unwrap_or_default();
        self.workers
            .append_health_log(NewHealthLog::new(worker_id, MetricType::Heartbeat, load as f64))
            .await?;

        if self.settings.sample_cpu {
            let cpu = self.cpu.sample();
            self.workers
                .append_health_log(NewHealthLog::new(worker_id, MetricType::CpuUsage, cpu))
                .await?;
        }

        Ok(())
    }

    /// 停止节点的心跳任务，返回是否存在该任务
    pub fn stop_worker_heartbeat(&self, worker_id: Uuid) -> bool {
        match self.heartbeats.remove(&worker_id) {
            Some((_, token)) => {
                token.cancel();
                debug!("Stopped heartbeat for worker {}", worker_id);
                true
            }
            None => false,
        }
    }

    /// 节点健康摘要
    pub async fn get_worker_health(&self, worker_id: Uuid) -> OrchestratorResult<WorkerHealth> {
        let worker = self.find_worker(worker_id).await?;
        Ok(WorkerHealth {
            status: worker.status,
            last_heartbeat: worker.last_heartbeat,
            health_score: worker.health_score,
            load: worker.current_load,
        })
    }

    /// 记录健康分数并按阈值切换 ACTIVE / DEGRADED
    ///
    /// DRAINING 和 FAILED 节点的状态不受影响。返回更新后的状态。
    pub async fn record_health_score(
        &self,
        worker_id: Uuid,
        score: f64,
    ) -> OrchestratorResult<WorkerStatus> {
        if score.is_nan() {
            return Err(OrchestratorError::Validation(
                "health score must be a number".to_string(),
            ));
        }
        let score = score.clamp(0.0, 1.0);

        if !self.workers.set_health_score(worker_id, score).await? {
            return Err(OrchestratorError::NotFound(format!("worker {}", worker_id)));
        }
        self.workers
            .append_health_log(NewHealthLog::new(worker_id, MetricType::HealthScore, score))
            .await?;
        gauge!(WORKER_HEALTH_SCORE, "worker_id" => worker_id.to_string()).set(score);

        if score < self.settings.degraded_threshold {
            if self
                .workers
                .transition_status(worker_id, &[WorkerStatus::Active], WorkerStatus::Degraded)
                .await?
            {
                warn!("Worker {} degraded (health {:.2})", worker_id, score);
            }
        } else if self
            .workers
            .transition_status(worker_id, &[WorkerStatus::Degraded], WorkerStatus::Active)
            .await?
        {
            info!("Worker {} recovered (health {:.2})", worker_id, score);
            self.workers
                .append_health_log(NewHealthLog::new(worker_id, MetricType::Recovery, score))
                .await?;
        }

        Ok(self.find_worker(worker_id).await?.status)
    }

    /// 根据最近的健康分数预测节点失败
    #[instrument(skip(self))]
    pub async fn predict_failure(&self, worker_id: Uuid) -> OrchestratorResult<FailurePrediction> {
        let worker = self.find_worker(worker_id).await?;
        let samples = self
            .workers
            .recent_health_logs(
                worker_id,
                Some(MetricType::HealthScore),
                self.settings.prediction_window,
            )
            .await?;

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let prediction = compute_prediction(worker_id, worker.health_score, &values, &self.settings);
        let prediction = self.predictor.adjust(prediction, &samples).await;

        let details = serde_json::to_value(&prediction).unwrap_or_default();
        self.workers
            .append_health_log(
                NewHealthLog::new(
                    worker_id,
                    MetricType::FailurePrediction,
                    prediction.probability,
                )
                .with_details(details.clone()),
            )
            .await?;
        self.memory
            .store(&format!("worker/{}/prediction", worker_id), details)
            .await;

        if prediction.recommended_action == RecommendedAction::PreemptiveRestart {
            warn!(
                "Worker {} failure probability {:.2}, preemptive restart recommended",
                worker_id, prediction.probability
            );
        }
        Ok(prediction)
    }

    /// 检测各指标最新样本的异常
    #[instrument(skip(self))]
    pub async fn detect_anomalies(&self, worker_id: Uuid) -> OrchestratorResult<Vec<Anomaly>> {
        self.find_worker(worker_id).await?;
        let logs = self
            .workers
            .recent_health_logs(worker_id, None, self.settings.anomaly_window)
            .await?;

        // Newest first within each metric type
        let mut series: HashMap<MetricType, Vec<f64>> = HashMap::new();
        let mut order = Vec::new();
        for log in logs.iter().filter(|l| l.metric_type != MetricType::Alert) {
            series
                .entry(log.metric_type)
                .or_insert_with(|| {
                    order.push(log.metric_type);
                    Vec::new()
                })
                .push(log.value);
        }

        let mut anomalies = Vec::new();
        for metric_type in order {
            let Some(anomaly) = series
                .get(&metric_type)
                .and_then(|values| detect_anomaly(metric_type, values, self.settings.anomaly_z_threshold))
            else {
                continue;
            };

            self.workers
                .append_health_log(
                    NewHealthLog::new(worker_id, MetricType::Alert, anomaly.z_score).with_details(
                        serde_json::json!({
                            "metric_type": anomaly.metric_type,
                            "value": anomaly.value,
                            "mean": anomaly.mean,
                            "std_dev": anomaly.std_dev,
                            "severity": anomaly.severity,
                        }),
                    ),
                )
                .await?;
            warn!(
                "Anomaly on worker {}: {} = {:.3} (z = {:.2})",
                worker_id, anomaly.metric_type, anomaly.value, anomaly.z_score
            );
            anomalies.push(anomaly);
        }

        Ok(anomalies)
    }

    /// 选择最适合接收作业的活跃节点
    ///
    /// 健康分数最高者优先，分数相同时负载比例低者优先
    pub async fn get_optimal_worker(
        &self,
        criteria: OptimalWorkerCriteria,
    ) -> OrchestratorResult<Option<Worker>> {
        let mut candidates: Vec<Worker> = self
            .workers
            .find_by_statuses(&[WorkerStatus::Active])
            .await?
            .into_iter()
            .filter(|w| w.health_score >= criteria.min_health_score)
            .filter(|w| w.current_load < w.capacity && w.load_ratio() <= criteria.max_load_ratio)
            .filter(|w| {
                criteria
                    .worker_type
                    .as_deref()
                    .map_or(true, |t| w.worker_type == t)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.health_score
                .total_cmp(&a.health_score)
                .then_with(|| a.load_ratio().total_cmp(&b.load_ratio()))
        });

        Ok(candidates.into_iter().next())
    }

    /// 疏散节点
    ///
    /// 节点标记为 DRAINING 并记录原因；`reassign_jobs` 为真时其处理中的作业
    /// 全部回到 PENDING 并重新入队。返回被重新分配的作业ID。
    /// 已是 FAILED 的节点保持原状态，返回空列表。
    #[instrument(skip(self))]
    pub async fn evacuate_worker(
        &self,
        worker_id: Uuid,
        reason: &str,
        reassign_jobs: bool,
    ) -> OrchestratorResult<Vec<Uuid>> {
        let worker = self
            .workers
            .find_by_id(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("worker {}", worker_id)))?;
        if worker.status == WorkerStatus::Failed {
            debug!("Worker {} already failed, skipping evacuation", worker_id);
            return Ok(Vec::new());
        }

        let evacuated_at = Utc::now();
        let metadata = serde_json::json!({
            "evacuation_reason": reason,
            "evacuated_at": evacuated_at.to_rfc3339(),
        });
        if !self.workers.mark_draining(worker_id, metadata.clone()).await? {
            // Failed or removed since the lookup
            debug!("Worker {} left before it could be drained", worker_id);
            return Ok(Vec::new());
        }

        self.workers
            .append_health_log(
                NewHealthLog::new(worker_id, MetricType::Alert, 1.0).with_details(metadata.clone()),
            )
            .await?;
        self.memory
            .store(&format!("worker/{}/evacuation", worker_id), metadata)
            .await;

        let reassigned = if reassign_jobs {
            self.job_service.reassign_worker_jobs(worker_id).await?
        } else {
            Vec::new()
        };

        warn!(
            "Evacuated worker {} ({}), reassigned {} jobs",
            worker_id,
            reason,
            reassigned.len()
        );
        Ok(reassigned)
    }

    /// 标记节点失败并重新分配其作业
    ///
    /// 已是 FAILED 的节点不做任何处理
    pub async fn mark_worker_failed(&self, worker_id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        if !self.workers.mark_failed(worker_id).await? {
            return Ok(Vec::new());
        }

        self.stop_worker_heartbeat(worker_id);
        self.workers
            .append_health_log(
                NewHealthLog::new(worker_id, MetricType::Alert, 1.0)
                    .with_details(serde_json::json!({"reason": "worker marked failed"})),
            )
            .await?;
        gauge!(WORKER_HEALTH_SCORE, "worker_id" => worker_id.to_string()).set(0.0);

        let reassigned = self.job_service.reassign_worker_jobs(worker_id).await?;
        error!(
            "Worker {} marked failed, reassigned {} jobs",
            worker_id,
            reassigned.len()
        );
        Ok(reassigned)
    }

    /// 根据心跳时效和近期执行错误率刷新所有存活节点的健康分数
    ///
    /// 心跳超时的节点被标记为 FAILED。返回被标记失败的节点数。
    pub async fn refresh_health_scores(&self) -> OrchestratorResult<usize> {
        let live = self
            .workers
            .find_by_statuses(&[
                WorkerStatus::Active,
                WorkerStatus::Degraded,
                WorkerStatus::Draining,
            ])
            .await?;

        let now = Utc::now();
        let timeout_ms = self.settings.heartbeat_timeout_ms.max(1) as f64;
        let mut failed = 0;

        for worker in live {
            let silent_ms = (now - worker.last_heartbeat).num_milliseconds().max(0) as f64;
            let staleness = silent_ms / timeout_ms;

            if staleness >= 1.0 {
                self.mark_worker_failed(worker.id).await?;
                failed += 1;
                continue;
            }

            let executions = self
                .jobs
                .recent_worker_executions(worker.id, self.settings.error_rate_window)
                .await?;
            let finished: Vec<_> = executions
                .iter()
                .filter(|e| matches!(e.status, ExecutionStatus::Completed | ExecutionStatus::Failed))
                .collect();
            let error_rate = if finished.is_empty() {
                0.0
            } else {
                finished
                    .iter()
                    .filter(|e| e.status == ExecutionStatus::Failed)
                    .count() as f64
                    / finished.len() as f64
            };

            let score = health_score(staleness, error_rate);
            self.record_health_score(worker.id, score).await?;
        }

        Ok(failed)
    }

    /// 停止所有心跳任务
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.heartbeats.clear();
    }

    async fn find_worker(&self, worker_id: Uuid) -> OrchestratorResult<Worker> {
        self.workers
            .find_by_id(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("worker {}", worker_id)))
    }

    fn start_heartbeat(&self, worker_id: Uuid, period: Duration) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.heartbeats.insert(worker_id, token.clone()) {
            previous.cancel();
        }

        let monitor = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.heartbeat(worker_id).await {
                            error!("Heartbeat for worker {} failed: {}", worker_id, e);
                        }
                    }
                }
            }
            debug!("Heartbeat task for worker {} exited", worker_id);
        });
    }
}

/// 由心跳时效和错误率计算健康分数
pub fn health_score(staleness: f64, error_rate: f64) -> f64 {
    (1.0 - 0.5 * staleness.min(1.0) - 0.5 * error_rate).clamp(0.0, 1.0)
}

/// 根据最新在前的健康分数序列计算失败预测
pub fn compute_prediction(
    worker_id: Uuid,
    fallback_score: f64,
    newest_first: &[f64],
    settings: &HealthSettings,
) -> FailurePrediction {
    let current = newest_first.first().copied().unwrap_or(fallback_score);

    if newest_first.len() < settings.min_prediction_samples.max(2) {
        return FailurePrediction {
            worker_id,
            probability: 0.1,
            time_to_failure_ms: None,
            recommended_action: RecommendedAction::Continue,
            current_score: current,
            degradation_rate: 0.0,
            sample_count: newest_first.len(),
        };
    }

    let rate = newest_first
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .sum::<f64>()
        / (newest_first.len() - 1) as f64;

    let probability = ((1.0 - current) * (1.0 + 2.0 * rate.abs())).clamp(0.0, 1.0);
    let recommended_action = if probability > 0.7 {
        RecommendedAction::PreemptiveRestart
    } else if probability > 0.4 {
        RecommendedAction::Watch
    } else {
        RecommendedAction::Continue
    };

    let time_to_failure_ms = (rate > 0.0).then(|| {
        if current <= settings.failure_floor {
            0
        } else {
            ((current - settings.failure_floor) / rate * settings.sampling_interval_secs * 1000.0)
                as u64
        }
    });

    FailurePrediction {
        worker_id,
        probability,
        time_to_failure_ms,
        recommended_action,
        current_score: current,
        degradation_rate: rate,
        sample_count: newest_first.len(),
    }
}

/// 最新样本相对整个序列的 z-score 超过阈值时返回异常
pub fn detect_anomaly(metric_type: MetricType, newest_first: &[f64], threshold: f64) -> Option<Anomaly> {
    if newest_first.len() < 2 {
        return None;
    }

    let n = newest_first.len() as f64;
    let mean = newest_first.iter().sum::<f64>() / n;
    let variance = newest_first.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return None;
    }

    let value = newest_first[0];
    let z_score = (value - mean).abs() / std_dev;
    if z_score <= threshold {
        return None;
    }

    Some(Anomaly {
        metric_type,
        value,
        mean,
        std_dev,
        z_score,
        severity: z_score.floor().clamp(1.0, 5.0) as u8,
    })
}

#[cfg(test)]
#[path = "health_monitor_test.rs"]
mod tests;
