// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::execution_context::{VectorEntry, VectorKind};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::vector_store::{cosine_similarity, rank_matches, VectorStore};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// 进程内向量存储，按 (引用 ID, 类别) 索引
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: DashMap<(Uuid, VectorKind), VectorEntry>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, entry: VectorEntry) -> Result<(), RepositoryError> {
        self.entries.insert((entry.ref_id, entry.kind), entry);
        Ok(())
    }

    async fn find_by_ref(
        &self,
        ref_id: Uuid,
        kind: VectorKind,
    ) -> Result<Option<VectorEntry>, RepositoryError> {
        Ok(self.entries.get(&(ref_id, kind)).map(|e| e.value().clone()))
    }

    async fn search(
        &self,
        query: &[f32],
        kind: VectorKind,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(VectorEntry, f32)>, RepositoryError> {
        let matches = self
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| {
                let similarity = cosine_similarity(query, &e.embedding);
                (similarity >= threshold).then(|| (e.value().clone(), similarity))
            })
            .collect();

        Ok(rank_matches(matches, limit))
    }

    async fn delete(&self, ref_id: Uuid, kind: VectorKind) -> Result<u64, RepositoryError> {
        Ok(self.entries.remove(&(ref_id, kind)).map_or(0, |_| 1))
    }
}
