// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::worker::{FailurePrediction, HealthLogEntry};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// 失败预测钩子
///
/// 健康监控先按统计规则算出预测，再交给钩子修正。
/// 外部模型（例如训练好的分类器）通过实现该特质接入。
#[async_trait]
pub trait FailurePredictor: Send + Sync {
    async fn adjust(
        &self,
        prediction: FailurePrediction,
        history: &[HealthLogEntry],
    ) -> FailurePrediction;
}

/// 默认预测钩子：原样返回统计预测
#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticalPredictor;

#[async_trait]
impl FailurePredictor for StatisticalPredictor {
    async fn adjust(
        &self,
        prediction: FailurePrediction,
        _history: &[HealthLogEntry],
    ) -> FailurePrediction {
        prediction
    }
}

/// 协调内存
///
/// 各服务共享的键值记录，用于把预测、疏散等决策暴露给外部协调者
#[async_trait]
pub trait CoordinationMemory: Send + Sync {
    async fn store(&self, key: &str, value: serde_json::Value);

    async fn retrieve(&self, key: &str) -> Option<serde_json::Value>;
}

/// 进程内协调内存
#[derive(Debug, Default)]
pub struct InMemoryCoordination {
    entries: DashMap<String, serde_json::Value>,
}

impl InMemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationMemory for InMemoryCoordination {
    async fn store(&self, key: &str, value: serde_json::Value) {
        self.entries.insert(key.to_string(), value);
    }

    async fn retrieve(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }
}

/// 文本嵌入
pub trait Embedder: Send + Sync {
    /// 向量维度
    fn dimension(&self) -> usize;

    /// 生成定长向量
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// 基于特征哈希的确定性嵌入
///
/// 每个词元经 SHA-256 映射到一个维度和符号，累加后做 L2 归一化。
/// 共享词元越多的文本余弦相似度越高。
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

/// 将特征向量补零或截断到指定维度
pub fn pad_features(features: &[f32], dimension: usize) -> Vec<f32> {
    let mut vector = features.to_vec();
    vector.resize(dimension, 0.0);
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::vector_store::cosine_similarity;

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.embed("resize image batch");
        let b = embedder.embed("resize image batch");

        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_similarity_tracks_shared_tokens() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("{\"task\":\"resize\",\"format\":\"png\"}");
        let close = embedder.embed("{\"task\":\"resize\",\"format\":\"png\",\"retry\":1}");
        let far = embedder.embed("send welcome email");

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed("  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_pad_features() {
        assert_eq!(pad_features(&[2.0, 3.0], 4), vec![2.0, 3.0, 0.0, 0.0]);
        assert_eq!(pad_features(&[2.0, 3.0], 1), vec![2.0]);
    }

    #[tokio::test]
    async fn test_in_memory_coordination_overwrites() {
        let memory = InMemoryCoordination::new();
        memory.store("k", serde_json::json!(1)).await;
        memory.store("k", serde_json::json!(2)).await;
        assert_eq!(memory.retrieve("k").await, Some(serde_json::json!(2)));
        assert_eq!(memory.retrieve("missing").await, None);
    }
}
