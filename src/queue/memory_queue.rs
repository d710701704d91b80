// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::priority_queue::{PriorityQueue, QueueEntry, QueueError};
use crate::domain::models::job::PriorityTier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

#[derive(Default)]
struct QueueState {
    tiers: [VecDeque<Uuid>; 3],
    enqueued_at: HashMap<Uuid, DateTime<Utc>>,
    in_flight: HashMap<Uuid, Vec<Uuid>>,
}

/// 进程内优先级队列
///
/// 单节点部署与测试使用，所有操作在同一把锁内完成
#[derive(Default)]
pub struct MemoryPriorityQueue {
    state: Mutex<QueueState>,
}

impl MemoryPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将条目的入队时间提前 `age`，用于模拟长时间等待
    pub fn backdate(&self, job_id: Uuid, age: chrono::Duration) {
        let mut state = self.state.lock();
        if let Some(at) = state.enqueued_at.get_mut(&job_id) {
            *at -= age;
        }
    }
}

#[async_trait]
impl PriorityQueue for MemoryPriorityQueue {
    async fn push(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.tiers[tier.index()].push_back(job_id);
        state.enqueued_at.insert(job_id, Utc::now());
        Ok(())
    }

    async fn requeue(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.tiers[tier.index()].push_front(job_id);
        state.enqueued_at.entry(job_id).or_insert_with(Utc::now);
        Ok(())
    }

    async fn pop_transfer(
        &self,
        tier: PriorityTier,
        worker_id: Uuid,
    ) -> Result<Option<Uuid>, QueueError> {
        let mut state = self.state.lock();
        let popped = state.tiers[tier.index()].pop_front();
        if let Some(job_id) = popped {
            state.in_flight.entry(worker_id).or_default().push(job_id);
        }
        Ok(popped)
    }

    async fn remove_in_flight(&self, worker_id: Uuid, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if let Some(list) = state.in_flight.get_mut(&worker_id) {
            list.retain(|id| *id != job_id);
            if list.is_empty() {
                state.in_flight.remove(&worker_id);
            }
        }
        let still_queued = state.tiers.iter().any(|q| q.contains(&job_id));
        if !still_queued {
            state.enqueued_at.remove(&job_id);
        }
        Ok(())
    }

    async fn in_flight(&self, worker_id: Uuid) -> Result<Vec<Uuid>, QueueError> {
        Ok(self
            .state
            .lock()
            .in_flight
            .get(&worker_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_in_flight(&self, worker_id: Uuid) -> Result<(), QueueError> {
        self.state.lock().in_flight.remove(&worker_id);
        Ok(())
    }

    async fn entries(&self, tier: PriorityTier) -> Result<Vec<QueueEntry>, QueueError> {
        let state = self.state.lock();
        Ok(state.tiers[tier.index()]
            .iter()
            .map(|id| QueueEntry {
                job_id: *id,
                enqueued_at: state.enqueued_at.get(id).copied().unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn promote(
        &self,
        job_id: Uuid,
        from: PriorityTier,
        to: PriorityTier,
    ) -> Result<bool, QueueError> {
        let mut state = self.state.lock();
        let source = &mut state.tiers[from.index()];
        let Some(pos) = source.iter().position(|id| *id == job_id) else {
            return Ok(false);
        };
        source.remove(pos);
        state.tiers[to.index()].push_back(job_id);
        state.enqueued_at.insert(job_id, Utc::now());
        Ok(true)
    }

    async fn remove(&self, tier: PriorityTier, job_id: Uuid) -> Result<bool, QueueError> {
        let mut state = self.state.lock();
        let queue = &mut state.tiers[tier.index()];
        let before = queue.len();
        queue.retain(|id| *id != job_id);
        let removed = queue.len() != before;
        if removed {
            state.enqueued_at.remove(&job_id);
        }
        Ok(removed)
    }

    async fn len(&self, tier: PriorityTier) -> Result<usize, QueueError> {
        Ok(self.state.lock().tiers[tier.index()].len())
    }
}
