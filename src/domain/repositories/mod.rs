// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 作业仓库（job_repository）：作业、依赖边、执行记录和死信
/// - 节点仓库（worker_repository）：节点注册信息和健康日志
/// - 快照仓库（snapshot_repository）：系统状态快照
/// - 向量存储（vector_store）：执行上下文与快照的相似度检索
pub mod job_repository;
pub mod snapshot_repository;
pub mod vector_store;
pub mod worker_repository;
