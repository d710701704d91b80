// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// 工作节点实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub worker_type: String,
    pub status: WorkerStatus,
    /// 最大并发作业数
    pub capacity: i32,
    /// 当前持有的作业数，始终位于 [0, capacity]
    pub current_load: i32,
    /// 健康分数 [0, 1]
    pub health_score: f64,
    pub last_heartbeat: DateTime<Utc>,
    pub failure_count: i32,
    pub capabilities: Vec<String>,
    /// 附加注解（疏散原因等）
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// 根据请求构建新的活跃节点
    pub fn new(request: &SpawnWorkerRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            worker_type: request.worker_type.clone(),
            status: WorkerStatus::Active,
            capacity: request.max_concurrent_jobs,
            current_load: 0,
            health_score: 1.0,
            last_heartbeat: now,
            failure_count: 0,
            capabilities: request.capabilities.clone(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// 当前负载占容量的比例
    pub fn load_ratio(&self) -> f64 {
        if self.capacity <= 0 {
            return 1.0;
        }
        self.current_load as f64 / self.capacity as f64
    }

    /// 节点是否可以接收新作业
    pub fn can_accept_jobs(&self) -> bool {
        self.status.accepts_jobs() && self.current_load < self.capacity
    }
}

/// 工作节点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    #[default]
    Active,
    /// 健康分数低于阈值，仍可接收作业
    Degraded,
    /// 正在疏散，不再接收作业
    Draining,
    /// 心跳丢失或被判定失败
    Failed,
}

impl WorkerStatus {
    pub fn accepts_jobs(&self) -> bool {
        matches!(self, WorkerStatus::Active | WorkerStatus::Degraded)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkerStatus::Active => write!(f, "ACTIVE"),
            WorkerStatus::Degraded => write!(f, "DEGRADED"),
            WorkerStatus::Draining => write!(f, "DRAINING"),
            WorkerStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(WorkerStatus::Active),
            "DEGRADED" => Ok(WorkerStatus::Degraded),
            "DRAINING" => Ok(WorkerStatus::Draining),
            "FAILED" => Ok(WorkerStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 启动工作节点请求
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SpawnWorkerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    #[serde(default = "default_worker_type")]
    pub worker_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: i32,
    #[validate(range(min = 1))]
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_worker_type() -> String {
    "general".to_string()
}

fn default_max_concurrent_jobs() -> i32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl SpawnWorkerRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker_type: default_worker_type(),
            capabilities: Vec::new(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }

    pub fn with_type(mut self, worker_type: impl Into<String>) -> Self {
        self.worker_type = worker_type.into();
        self
    }

    pub fn with_capacity(mut self, max_concurrent_jobs: i32) -> Self {
        self.max_concurrent_jobs = max_concurrent_jobs;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval: u64) -> Self {
        self.heartbeat_interval_ms = interval;
        self
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = String>) -> Self {
        self.capabilities.extend(caps);
        self
    }
}

/// 健康日志指标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Heartbeat,
    CpuUsage,
    HealthScore,
    FailurePrediction,
    Alert,
    Recovery,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MetricType::Heartbeat => "heartbeat",
            MetricType::CpuUsage => "cpu_usage",
            MetricType::HealthScore => "health_score",
            MetricType::FailurePrediction => "failure_prediction",
            MetricType::Alert => "alert",
            MetricType::Recovery => "recovery",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MetricType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heartbeat" => Ok(MetricType::Heartbeat),
            "cpu_usage" => Ok(MetricType::CpuUsage),
            "health_score" => Ok(MetricType::HealthScore),
            "failure_prediction" => Ok(MetricType::FailurePrediction),
            "alert" => Ok(MetricType::Alert),
            "recovery" => Ok(MetricType::Recovery),
            _ => Err(()),
        }
    }
}

/// 健康日志条目（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLogEntry {
    pub id: i64,
    pub worker_id: Uuid,
    pub metric_type: MetricType,
    pub value: f64,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// 待写入的健康日志
#[derive(Debug, Clone)]
pub struct NewHealthLog {
    pub worker_id: Uuid,
    pub metric_type: MetricType,
    pub value: f64,
    pub details: serde_json::Value,
}

impl NewHealthLog {
    pub fn new(worker_id: Uuid, metric_type: MetricType, value: f64) -> Self {
        Self {
            worker_id,
            metric_type,
            value,
            details: serde_json::json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// 节点健康摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub health_score: f64,
    pub load: i32,
}

/// 建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Continue,
    Watch,
    PreemptiveRestart,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecommendedAction::Continue => write!(f, "CONTINUE"),
            RecommendedAction::Watch => write!(f, "WATCH"),
            RecommendedAction::PreemptiveRestart => write!(f, "PREEMPTIVE_RESTART"),
        }
    }
}

/// 失败预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    pub worker_id: Uuid,
    /// 失败概率 [0, 1]
    pub probability: f64,
    /// 预计距离失败的时间（毫秒），`None` 表示无法推算
    pub time_to_failure_ms: Option<u64>,
    pub recommended_action: RecommendedAction,
    /// 最近的健康分数
    pub current_score: f64,
    /// 退化速率（正值表示下降）
    pub degradation_rate: f64,
    pub sample_count: usize,
}

/// 检测到的异常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_type: MetricType,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    /// 严重程度 1-5
    pub severity: u8,
}

/// 选择最优节点的条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalWorkerCriteria {
    pub min_health_score: f64,
    pub max_load_ratio: f64,
    pub worker_type: Option<String>,
}

impl Default for OptimalWorkerCriteria {
    fn default() -> Self {
        Self {
            min_health_score: 0.5,
            max_load_ratio: 0.8,
            worker_type: None,
        }
    }
}
