// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 需要 Docker，使用 `cargo test -- --ignored` 运行

use orchestrs::domain::models::job::PriorityTier;
use orchestrs::infrastructure::cache::redis_client::RedisClient;
use orchestrs::infrastructure::cache::redis_queue::RedisPriorityQueue;
use orchestrs::queue::priority_queue::PriorityQueue;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use uuid::Uuid;

async fn start_redis() -> (ContainerAsync<GenericImage>, RedisPriorityQueue) {
    let node = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("Failed to start Redis");
    let port = node
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get Redis port");

    let client = RedisClient::new(&format!("redis://127.0.0.1:{}", port))
        .await
        .expect("Failed to connect to Redis");
    (node, RedisPriorityQueue::new(client, "orchestrs-test"))
}

#[tokio::test]
#[ignore]
async fn test_redis_queue_fifo_and_in_flight() {
    let (_node, queue) = start_redis().await;
    let worker = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    queue.push(PriorityTier::High, first).await.unwrap();
    queue.push(PriorityTier::High, second).await.unwrap();
    assert_eq!(queue.len(PriorityTier::High).await.unwrap(), 2);

    assert_eq!(
        queue.pop_transfer(PriorityTier::High, worker).await.unwrap(),
        Some(first)
    );
    assert_eq!(queue.in_flight(worker).await.unwrap(), vec![first]);

    // Requeue goes to the head of the tier
    queue.requeue(PriorityTier::High, first).await.unwrap();
    queue.remove_in_flight(worker, first).await.unwrap();
    let ids: Vec<Uuid> = queue
        .entries(PriorityTier::High)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.job_id)
        .collect();
    assert_eq!(ids, vec![first, second]);
    assert!(queue.in_flight(worker).await.unwrap().is_empty());

    assert_eq!(
        queue.pop_transfer(PriorityTier::Low, worker).await.unwrap(),
        None
    );
}

#[tokio::test]
#[ignore]
async fn test_redis_queue_promote_and_remove() {
    let (_node, queue) = start_redis().await;
    let job = Uuid::new_v4();
    let other = Uuid::new_v4();

    queue.push(PriorityTier::Low, job).await.unwrap();
    queue.push(PriorityTier::Low, other).await.unwrap();

    assert!(queue
        .promote(job, PriorityTier::Low, PriorityTier::Medium)
        .await
        .unwrap());
    assert!(!queue
        .promote(job, PriorityTier::Low, PriorityTier::Medium)
        .await
        .unwrap());

    let depths = queue.depths().await.unwrap();
    assert_eq!((depths.high, depths.medium, depths.low), (0, 1, 1));

    assert!(queue.remove(PriorityTier::Low, other).await.unwrap());
    assert!(!queue.remove(PriorityTier::Low, other).await.unwrap());
    assert_eq!(queue.depths().await.unwrap().total(), 1);

    let worker = Uuid::new_v4();
    queue.pop_transfer(PriorityTier::Medium, worker).await.unwrap();
    queue.clear_in_flight(worker).await.unwrap();
    assert!(queue.in_flight(worker).await.unwrap().is_empty());
}
