// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 向量条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    ExecutionContext,
    Snapshot,
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VectorKind::ExecutionContext => write!(f, "execution_context"),
            VectorKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl FromStr for VectorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "execution_context" => Ok(VectorKind::ExecutionContext),
            "snapshot" => Ok(VectorKind::Snapshot),
            _ => Err(()),
        }
    }
}

/// 向量存储条目
///
/// `ref_id` 指向作业 ID（执行上下文）或快照 ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: Uuid,
    pub ref_id: Uuid,
    pub kind: VectorKind,
    pub content: serde_json::Value,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl VectorEntry {
    pub fn new(
        ref_id: Uuid,
        kind: VectorKind,
        content: serde_json::Value,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ref_id,
            kind,
            content,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// 执行上下文检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub job_id: Uuid,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<VectorEntry> for ExecutionContext {
    fn from(entry: VectorEntry) -> Self {
        Self {
            job_id: entry.ref_id,
            context: entry.content,
            created_at: entry.created_at,
        }
    }
}

/// 相似执行匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarExecution {
    pub job_id: Uuid,
    pub context: serde_json::Value,
    pub similarity: f32,
}
