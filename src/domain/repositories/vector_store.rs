// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::job_repository::RepositoryError;
use crate::domain::models::execution_context::{VectorEntry, VectorKind};
use async_trait::async_trait;
use uuid::Uuid;

/// 向量存储特质
///
/// 保存带嵌入向量的 JSON 记录，支持按引用 ID 查找和余弦相似度检索。
/// 每个引用 ID 在同一类别下只保留一条条目。
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 写入条目，覆盖同一引用 ID 与类别的已有条目
    async fn upsert(&self, entry: VectorEntry) -> Result<(), RepositoryError>;

    /// 引用 ID 对应的条目
    async fn find_by_ref(
        &self,
        ref_id: Uuid,
        kind: VectorKind,
    ) -> Result<Option<VectorEntry>, RepositoryError>;

    /// 相似度不低于 `threshold` 的条目，按相似度降序，最多 `limit` 条
    async fn search(
        &self,
        query: &[f32],
        kind: VectorKind,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(VectorEntry, f32)>, RepositoryError>;

    /// 删除引用 ID 对应的条目
    async fn delete(&self, ref_id: Uuid, kind: VectorKind) -> Result<u64, RepositoryError>;
}

/// 余弦相似度，长度不同时按较短的部分计算，零向量返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// 按相似度降序排序后截断
pub fn rank_matches(mut matches: Vec<(VectorEntry, f32)>, limit: usize) -> Vec<(VectorEntry, f32)> {
    matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(limit);
    matches
}
