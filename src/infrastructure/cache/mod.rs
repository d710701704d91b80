// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 提供 Redis 客户端以及基于 Redis 列表的优先级队列
pub mod redis_client;
pub mod redis_queue;
