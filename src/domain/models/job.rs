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

/// 最低优先级
pub const MIN_PRIORITY: i32 = 1;
/// 最高优先级
pub const MAX_PRIORITY: i32 = 5;

/// 作业实体
///
/// 表示提交给编排引擎的一个工作单元。作业具有优先级、
/// 依赖关系、重试上限和超时时间，由工作节点获取并执行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// 作业唯一标识符
    pub id: Uuid,
    /// 作业类型标签，由调用方定义
    pub job_type: String,
    /// 作业负载数据
    pub payload: serde_json::Value,
    /// 优先级（1-5），数值越大越紧急
    pub priority: i32,
    /// 作业状态
    pub status: JobStatus,
    /// 已重试次数
    pub retry_count: i32,
    /// 最大重试次数
    pub max_retries: i32,
    /// 执行超时（毫秒）
    pub timeout_ms: i64,
    /// 当前持有该作业的工作节点
    pub worker_id: Option<Uuid>,
    /// 执行结果
    pub result: Option<serde_json::Value>,
    /// 最近一次错误
    pub error: Option<serde_json::Value>,
    /// 最近一次进入优先级队列的时间，未排队时为空
    pub queued_at: Option<DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始执行时间
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 作业状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Processing → Completed/Failed，Processing 失败且可重试时回到 Pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// 等待调度（可能被依赖阻塞）
    #[default]
    Pending,
    /// 已被工作节点获取
    Processing,
    /// 成功完成
    Completed,
    /// 重试耗尽后失败
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 优先级队列层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// 按出队顺序排列的所有层级
    pub const ALL: [PriorityTier; 3] = [PriorityTier::High, PriorityTier::Medium, PriorityTier::Low];

    /// 根据优先级计算所属层级：≥4 高，2-3 中，1 低
    pub fn for_priority(priority: i32) -> Self {
        if priority >= 4 {
            PriorityTier::High
        } else if priority >= 2 {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    /// 数组下标，与 `ALL` 的顺序一致
    pub fn index(&self) -> usize {
        match self {
            PriorityTier::High => 0,
            PriorityTier::Medium => 1,
            PriorityTier::Low => 2,
        }
    }

    /// 饥饿晋升的目标层级及晋升后的最低优先级
    pub fn promotion_target(&self) -> Option<(PriorityTier, i32)> {
        match self {
            PriorityTier::Low => Some((PriorityTier::Medium, 2)),
            PriorityTier::Medium => Some((PriorityTier::High, 4)),
            PriorityTier::High => None,
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PriorityTier::High => write!(f, "high"),
            PriorityTier::Medium => write!(f, "medium"),
            PriorityTier::Low => write!(f, "low"),
        }
    }
}

/// 创建作业请求
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 255))]
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[validate(range(min = 1, max = 5))]
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[validate(range(min = 0, max = 100))]
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    /// 是否继承依赖作业的最高优先级
    #[serde(default = "default_inherit_priority")]
    pub inherit_priority: bool,
}

fn default_priority() -> i32 {
    3
}

fn default_max_retries() -> i32 {
    3
}

fn default_timeout_ms() -> i64 {
    300_000
}

fn default_inherit_priority() -> bool {
    true
}

impl CreateJobRequest {
    /// 使用默认参数创建请求
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: default_priority(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            depends_on: Vec::new(),
            inherit_priority: default_inherit_priority(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn without_inheritance(mut self) -> Self {
        self.inherit_priority = false;
        self
    }
}

impl Job {
    /// 根据请求构建一个新的待调度作业
    ///
    /// # 参数
    ///
    /// * `request` - 已校验的创建请求
    /// * `effective_priority` - 继承依赖后的有效优先级
    pub fn new(request: &CreateJobRequest, effective_priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: request.job_type.clone(),
            payload: request.payload.clone(),
            priority: effective_priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: request.max_retries,
            timeout_ms: request.timeout_ms,
            worker_id: None,
            result: None,
            error: None,
            queued_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// 作业当前优先级所属的队列层级
    pub fn tier(&self) -> PriorityTier {
        PriorityTier::for_priority(self.priority)
    }

    /// 失败后是否还能重试
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 处理中的作业是否已超过执行超时
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.started_at) {
            (JobStatus::Processing, Some(started)) => {
                now - started > chrono::Duration::milliseconds(self.timeout_ms)
            }
            _ => false,
        }
    }
}

/// 执行记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    /// 工作节点被疏散，作业重新分配
    Reassigned,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::Reassigned => write!(f, "REASSIGNED"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(ExecutionStatus::Running),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "REASSIGNED" => Ok(ExecutionStatus::Reassigned),
            _ => Err(()),
        }
    }
}

/// 作业执行记录
///
/// 每次获取作业生成一条，关闭后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: Uuid,
    /// 第几次尝试，从 1 开始
    pub attempt: i32,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<serde_json::Value>,
}

/// 死信记录
///
/// 重试耗尽的作业在最终失败时写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub error: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 各层级队列长度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}
