// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::create_test_db;
use orchestrs::domain::models::execution_context::{VectorEntry, VectorKind};
use orchestrs::domain::repositories::vector_store::VectorStore;
use orchestrs::infrastructure::repositories::memory_vector_store::MemoryVectorStore;
use orchestrs::infrastructure::repositories::vector_store_impl::VectorStoreImpl;
use serde_json::json;
use uuid::Uuid;

async fn exercise(store: &dyn VectorStore) {
    let near = Uuid::new_v4();
    let far = Uuid::new_v4();
    let snapshot = Uuid::new_v4();

    store
        .upsert(VectorEntry::new(
            near,
            VectorKind::ExecutionContext,
            json!({"name": "near"}),
            vec![1.0, 0.1, 0.0],
        ))
        .await
        .unwrap();
    store
        .upsert(VectorEntry::new(
            far,
            VectorKind::ExecutionContext,
            json!({"name": "far"}),
            vec![0.0, 0.0, 1.0],
        ))
        .await
        .unwrap();
    store
        .upsert(VectorEntry::new(
            snapshot,
            VectorKind::Snapshot,
            json!({}),
            vec![1.0, 0.0, 0.0],
        ))
        .await
        .unwrap();

    let hits = store
        .search(&[1.0, 0.0, 0.0], VectorKind::ExecutionContext, 10, 0.5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.ref_id, near);
    assert!(hits[0].1 > 0.99);

    let all = store
        .search(&[1.0, 0.0, 0.0], VectorKind::ExecutionContext, 10, 0.0)
        .await
        .unwrap();
    let order: Vec<Uuid> = all.iter().map(|(e, _)| e.ref_id).collect();
    assert_eq!(order, vec![near, far]);

    let entry = store
        .find_by_ref(near, VectorKind::ExecutionContext)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.content, json!({"name": "near"}));
    assert!(store
        .find_by_ref(near, VectorKind::Snapshot)
        .await
        .unwrap()
        .is_none());

    store
        .upsert(VectorEntry::new(
            near,
            VectorKind::ExecutionContext,
            json!({"name": "near", "pass": 2}),
            vec![1.0, 0.2, 0.0],
        ))
        .await
        .unwrap();
    let hits = store
        .search(&[1.0, 0.0, 0.0], VectorKind::ExecutionContext, 10, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.content, json!({"name": "near", "pass": 2}));

    assert_eq!(store.delete(snapshot, VectorKind::Snapshot).await.unwrap(), 1);
    assert_eq!(store.delete(snapshot, VectorKind::Snapshot).await.unwrap(), 0);
}

#[tokio::test]
async fn test_database_vector_store() {
    let store = VectorStoreImpl::new(create_test_db().await);
    exercise(&store).await;
}

#[tokio::test]
async fn test_memory_vector_store() {
    let store = MemoryVectorStore::new();
    exercise(&store).await;
}
