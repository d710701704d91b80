// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 作业服务（job_service）：作业创建、获取、完成与失败、依赖激活和优先级提升
/// - 健康监控（health_monitor）：节点心跳、健康分数、失败预测与疏散
/// - 状态持久化（state_persistence）：快照、时间点恢复和执行上下文检索
/// - 扩展钩子（hooks）：失败预测、协调内存和文本嵌入的可替换实现
pub mod health_monitor;
pub mod hooks;
pub mod job_service;
pub mod state_persistence;
