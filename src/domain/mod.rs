// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：作业、工作节点、快照和执行上下文
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：调度、健康监控和状态持久化
pub mod models;
pub mod repositories;
pub mod services;
