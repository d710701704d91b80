// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::create_test_db;
use chrono::{Duration, Utc};
use orchestrs::domain::models::snapshot::{Snapshot, SnapshotState, SnapshotType};
use orchestrs::domain::repositories::snapshot_repository::SnapshotRepository;
use orchestrs::infrastructure::repositories::snapshot_repo_impl::SnapshotRepositoryImpl;
use uuid::Uuid;

fn snapshot(snapshot_type: SnapshotType, age_secs: i64) -> Snapshot {
    let captured_at = Utc::now() - Duration::seconds(age_secs);
    Snapshot {
        id: Uuid::new_v4(),
        snapshot_type,
        description: None,
        base_snapshot_id: None,
        state: SnapshotState::V1 {
            workers: Vec::new(),
            jobs: Vec::new(),
            captured_at,
        },
        worker_count: 0,
        job_count: 0,
        created_at: captured_at,
    }
}

#[tokio::test]
async fn test_snapshot_round_trip_and_lookup_by_time() {
    let repo = SnapshotRepositoryImpl::new(create_test_db().await);
    let old = snapshot(SnapshotType::Full, 600);
    let recent = snapshot(SnapshotType::Auto, 60);
    repo.create(&old).await.unwrap();
    repo.create(&recent).await.unwrap();

    let loaded = repo.find_by_id(old.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, old.id);
    assert_eq!(loaded.snapshot_type, SnapshotType::Full);
    assert!(matches!(loaded.state, SnapshotState::V1 { .. }));
    assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());

    let at = Utc::now() - Duration::seconds(300);
    assert_eq!(
        repo.find_latest_at_or_before(at).await.unwrap().map(|s| s.id),
        Some(old.id)
    );
    assert_eq!(
        repo.find_latest_at_or_before(Utc::now()).await.unwrap().map(|s| s.id),
        Some(recent.id)
    );
    let too_early = Utc::now() - Duration::seconds(3600);
    assert!(repo.find_latest_at_or_before(too_early).await.unwrap().is_none());

    let ids: Vec<Uuid> = repo
        .list_summaries()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![recent.id, old.id]);
}

#[tokio::test]
async fn test_delete_older_than_only_touches_requested_type() {
    let repo = SnapshotRepositoryImpl::new(create_test_db().await);
    let manual = snapshot(SnapshotType::Full, 7200);
    let stale_auto = snapshot(SnapshotType::Auto, 7200);
    let fresh_auto = snapshot(SnapshotType::Auto, 10);
    for s in [&manual, &stale_auto, &fresh_auto] {
        repo.create(s).await.unwrap();
    }

    let cutoff = Utc::now() - Duration::seconds(3600);
    let removed = repo
        .delete_older_than(SnapshotType::Auto, cutoff)
        .await
        .unwrap();
    assert_eq!(removed, vec![stale_auto.id]);

    assert!(repo.find_by_id(manual.id).await.unwrap().is_some());
    assert!(repo.find_by_id(fresh_auto.id).await.unwrap().is_some());
    assert!(repo.find_by_id(stale_auto.id).await.unwrap().is_none());
}
