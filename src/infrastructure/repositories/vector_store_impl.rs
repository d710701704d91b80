// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::execution_context::{VectorEntry, VectorKind};
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::vector_store::{cosine_similarity, rank_matches, VectorStore};
use crate::infrastructure::database::entities::vector_entry;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 基于关系数据库的向量存储
///
/// 嵌入向量以 JSON 数组保存，检索时在内存中逐条计算余弦相似度
#[derive(Clone)]
pub struct VectorStoreImpl {
    db: Arc<DatabaseConnection>,
}

impl VectorStoreImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<vector_entry::Model> for VectorEntry {
    type Error = RepositoryError;

    fn try_from(model: vector_entry::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            ref_id: model.ref_id,
            kind: model
                .kind
                .parse()
                .map_err(|_| RepositoryError::Decode(format!("unknown vector kind {}", model.kind)))?,
            content: model.content,
            embedding: serde_json::from_value(model.embedding)?,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl VectorStore for VectorStoreImpl {
    async fn upsert(&self, entry: VectorEntry) -> Result<(), RepositoryError> {
        let model = vector_entry::ActiveModel {
            id: Set(entry.id),
            ref_id: Set(entry.ref_id),
            kind: Set(entry.kind.to_string()),
            content: Set(entry.content),
            embedding: Set(serde_json::to_value(&entry.embedding)?),
            created_at: Set(entry.created_at.into()),
        };

        vector_entry::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([vector_entry::Column::Kind, vector_entry::Column::RefId])
                    .update_columns([
                        vector_entry::Column::Content,
                        vector_entry::Column::Embedding,
                        vector_entry::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_ref(
        &self,
        ref_id: Uuid,
        kind: VectorKind,
    ) -> Result<Option<VectorEntry>, RepositoryError> {
        let model = vector_entry::Entity::find()
            .filter(vector_entry::Column::RefId.eq(ref_id))
            .filter(vector_entry::Column::Kind.eq(kind.to_string()))
            .one(self.db.as_ref())
            .await?;

        model.map(VectorEntry::try_from).transpose()
    }

    async fn search(
        &self,
        query: &[f32],
        kind: VectorKind,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(VectorEntry, f32)>, RepositoryError> {
        let models = vector_entry::Entity::find()
            .filter(vector_entry::Column::Kind.eq(kind.to_string()))
            .all(self.db.as_ref())
            .await?;

        let mut matches = Vec::new();
        for model in models {
            let entry = VectorEntry::try_from(model)?;
            let similarity = cosine_similarity(query, &entry.embedding);
            if similarity >= threshold {
                matches.push((entry, similarity));
            }
        }

        Ok(rank_matches(matches, limit))
    }

    async fn delete(&self, ref_id: Uuid, kind: VectorKind) -> Result<u64, RepositoryError> {
        let result = vector_entry::Entity::delete_many()
            .filter(vector_entry::Column::RefId.eq(ref_id))
            .filter(vector_entry::Column::Kind.eq(kind.to_string()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
