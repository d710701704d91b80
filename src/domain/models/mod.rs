// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 作业（job）：工作单元、执行记录与死信
/// - 工作节点（worker）：节点注册信息、健康日志与预测结果
/// - 快照（snapshot）：带版本的系统状态快照
/// - 执行上下文（execution_context）：向量存储中的上下文记录
pub mod execution_context;
pub mod job;
pub mod snapshot;
pub mod worker;
