// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 提供领域层抽象接口的具体实现：
/// - 缓存（cache）：Redis 客户端与基于 Redis 列表的优先级队列
/// - 数据库（database）：连接池、迁移与 SeaORM 实体
/// - 可观测性（observability）：Prometheus 指标与主机 CPU 采样
/// - 仓库实现（repositories）：作业、节点、快照和向量存储的实现
pub mod cache;
pub mod database;
pub mod observability;
pub mod repositories;
