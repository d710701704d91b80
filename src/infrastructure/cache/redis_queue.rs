// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::redis_client::RedisClient;
use crate::domain::models::job::PriorityTier;
use crate::queue::priority_queue::{PriorityQueue, QueueEntry, QueueError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use uuid::Uuid;

const PUSH_SCRIPT: &str = r#"
redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
return 1
"#;

const REQUEUE_SCRIPT: &str = r#"
redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('HSETNX', KEYS[2], ARGV[1], ARGV[2])
return 1
"#;

const PROMOTE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed == 0 then
  return 0
end
redis.call('RPUSH', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[2])
return 1
"#;

const REMOVE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 0, ARGV[1])
if removed > 0 then
  redis.call('HDEL', KEYS[2], ARGV[1])
end
return removed
"#;

// KEYS[1] in-flight list, KEYS[2] timestamp hash, KEYS[3..5] tier lists
const REMOVE_IN_FLIGHT_SCRIPT: &str = r#"
redis.call('LREM', KEYS[1], 0, ARGV[1])
for i = 3, 5 do
  if redis.call('LPOS', KEYS[i], ARGV[1]) then
    return 0
  end
end
redis.call('HDEL', KEYS[2], ARGV[1])
return 1
"#;

/// 基于 Redis 列表的优先级队列
///
/// 键布局：
/// - `{prefix}:queue:{tier}` 层级列表
/// - `{prefix}:inflight:{worker_id}` 节点处理中列表
/// - `{prefix}:enqueued_at` 作业进入当前层级的时间（毫秒）
pub struct RedisPriorityQueue {
    client: RedisClient,
    prefix: String,
    push_script: Script,
    requeue_script: Script,
    promote_script: Script,
    remove_script: Script,
    remove_in_flight_script: Script,
}

impl RedisPriorityQueue {
    pub fn new(client: RedisClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            push_script: Script::new(PUSH_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
            promote_script: Script::new(PROMOTE_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
            remove_in_flight_script: Script::new(REMOVE_IN_FLIGHT_SCRIPT),
        }
    }

    fn tier_key(&self, tier: PriorityTier) -> String {
        format!("{}:queue:{}", self.prefix, tier)
    }

    fn in_flight_key(&self, worker_id: Uuid) -> String {
        format!("{}:inflight:{}", self.prefix, worker_id)
    }

    fn timestamps_key(&self) -> String {
        format!("{}:enqueued_at", self.prefix)
    }

    fn now_millis() -> String {
        Utc::now().timestamp_millis().to_string()
    }
}

fn parse_id(raw: &str) -> Result<Uuid, QueueError> {
    Uuid::parse_str(raw).map_err(|e| QueueError::InvalidEntry(format!("{}: {}", raw, e)))
}

#[async_trait]
impl PriorityQueue for RedisPriorityQueue {
    async fn push(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError> {
        let tier_key = self.tier_key(tier);
        let ts_key = self.timestamps_key();
        self.client
            .eval::<i64>(
                &self.push_script,
                &[tier_key, ts_key],
                &[job_id.to_string(), Self::now_millis()],
            )
            .await?;
        Ok(())
    }

    async fn requeue(&self, tier: PriorityTier, job_id: Uuid) -> Result<(), QueueError> {
        let tier_key = self.tier_key(tier);
        let ts_key = self.timestamps_key();
        self.client
            .eval::<i64>(
                &self.requeue_script,
                &[tier_key, ts_key],
                &[job_id.to_string(), Self::now_millis()],
            )
            .await?;
        Ok(())
    }

    async fn pop_transfer(
        &self,
        tier: PriorityTier,
        worker_id: Uuid,
    ) -> Result<Option<Uuid>, QueueError> {
        let popped = self
            .client
            .lmove_left_right(&self.tier_key(tier), &self.in_flight_key(worker_id))
            .await?;

        popped.as_deref().map(parse_id).transpose()
    }

    async fn remove_in_flight(&self, worker_id: Uuid, job_id: Uuid) -> Result<(), QueueError> {
        let in_flight = self.in_flight_key(worker_id);
        let ts_key = self.timestamps_key();
        let high = self.tier_key(PriorityTier::High);
        let medium = self.tier_key(PriorityTier::Medium);
        let low = self.tier_key(PriorityTier::Low);
        self.client
            .eval::<i64>(
                &self.remove_in_flight_script,
                &[in_flight, ts_key, high, medium, low],
                &[job_id.to_string()],
            )
            .await?;
        Ok(())
    }

    async fn in_flight(&self, worker_id: Uuid) -> Result<Vec<Uuid>, QueueError> {
        let raw: Vec<String> = self
            .client
            .lrange_all(&self.in_flight_key(worker_id))
            .await?;
        raw.iter().map(|s| parse_id(s)).collect()
    }

    async fn clear_in_flight(&self, worker_id: Uuid) -> Result<(), QueueError> {
        self.client.del(&self.in_flight_key(worker_id)).await?;
        Ok(())
    }

    async fn entries(&self, tier: PriorityTier) -> Result<Vec<QueueEntry>, QueueError> {
        let raw: Vec<String> = self.client.lrange_all(&self.tier_key(tier)).await?;
        let stamps: Vec<Option<i64>> = self.client.hmget(&self.timestamps_key(), &raw).await?;

        raw.iter()
            .zip(stamps.into_iter().chain(std::iter::repeat(None)))
            .map(|(id, stamp)| {
                let enqueued_at = stamp
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .unwrap_or_else(Utc::now);
                Ok(QueueEntry {
                    job_id: parse_id(id)?,
                    enqueued_at,
                })
            })
            .collect()
    }

    async fn promote(
        &self,
        job_id: Uuid,
        from: PriorityTier,
        to: PriorityTier,
    ) -> Result<bool, QueueError> {
        let from_key = self.tier_key(from);
        let to_key = self.tier_key(to);
        let ts_key = self.timestamps_key();
        let moved: i64 = self
            .client
            .eval(
                &self.promote_script,
                &[from_key, to_key, ts_key],
                &[job_id.to_string(), Self::now_millis()],
            )
            .await?;
        Ok(moved == 1)
    }

    async fn remove(&self, tier: PriorityTier, job_id: Uuid) -> Result<bool, QueueError> {
        let tier_key = self.tier_key(tier);
        let ts_key = self.timestamps_key();
        let removed: i64 = self
            .client
            .eval(
                &self.remove_script,
                &[tier_key, ts_key],
                &[job_id.to_string()],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn len(&self, tier: PriorityTier) -> Result<usize, QueueError> {
        Ok(self.client.llen(&self.tier_key(tier)).await?)
    }
}
