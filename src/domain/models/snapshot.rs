// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job::Job;
use super::worker::Worker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 快照类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
    #[default]
    Full,
    Incremental,
    /// 定时任务创建，受保留期清理
    Auto,
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnapshotType::Full => write!(f, "FULL"),
            SnapshotType::Incremental => write!(f, "INCREMENTAL"),
            SnapshotType::Auto => write!(f, "AUTO"),
        }
    }
}

impl FromStr for SnapshotType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL" => Ok(SnapshotType::Full),
            "INCREMENTAL" => Ok(SnapshotType::Incremental),
            "AUTO" => Ok(SnapshotType::Auto),
            _ => Err(()),
        }
    }
}

/// 快照内容
///
/// 以带版本标签的形式序列化，恢复时按变体校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum SnapshotState {
    /// 完整状态
    V1 {
        workers: Vec<Worker>,
        jobs: Vec<Job>,
        captured_at: DateTime<Utc>,
    },
    /// 相对基准快照的增量：基准之后完成的作业
    Incremental {
        base_snapshot_id: Uuid,
        completed_jobs: Vec<Job>,
        captured_at: DateTime<Utc>,
    },
}

impl SnapshotState {
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            SnapshotState::V1 { captured_at, .. } => *captured_at,
            SnapshotState::Incremental { captured_at, .. } => *captured_at,
        }
    }
}

/// 快照实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub snapshot_type: SnapshotType,
    pub description: Option<String>,
    pub base_snapshot_id: Option<Uuid>,
    pub state: SnapshotState,
    pub worker_count: i32,
    pub job_count: i32,
    pub created_at: DateTime<Utc>,
}

/// 快照元数据（不含状态内容）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub snapshot_type: SnapshotType,
    pub created_at: DateTime<Utc>,
}

/// 创建快照请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub snapshot_type: SnapshotType,
    pub description: Option<String>,
    pub base_snapshot_id: Option<Uuid>,
}

impl CreateSnapshotRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn auto() -> Self {
        Self {
            snapshot_type: SnapshotType::Auto,
            description: Some("automatic snapshot".to_string()),
            base_snapshot_id: None,
        }
    }

    pub fn incremental(base_snapshot_id: Uuid) -> Self {
        Self {
            snapshot_type: SnapshotType::Incremental,
            description: None,
            base_snapshot_id: Some(base_snapshot_id),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 恢复选项
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// 保留与快照不一致的当前数据
    pub preserve_new_data: bool,
}

/// 冲突类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    WorkerStatusConflict,
}

/// 冲突处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    PreservedCurrent,
}

/// 恢复时记录的冲突
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreConflict {
    pub conflict_type: ConflictType,
    pub entity_id: Uuid,
    pub snapshot_value: String,
    pub current_value: String,
    pub resolution: ConflictResolution,
}

/// 恢复结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// 实际恢复的快照（增量快照链的末端）
    pub snapshot_id: Uuid,
    /// 按 `preserve_new_data` 保留当前值的冲突
    pub conflicts: Vec<RestoreConflict>,
    /// 恢复后重新入队的作业数
    pub requeued: usize,
}
