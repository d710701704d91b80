// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供数据库、Redis 队列、向量存储和指标导出等外部集成
pub mod infrastructure;

/// 队列模块
///
/// 优先级层级队列和维护调度
pub mod queue;

/// 工具模块
///
/// 提供错误类型、重试策略和日志初始化
pub mod utils;

/// 工作器模块
///
/// 后台任务（维护调度、自动快照）的生命周期管理
pub mod workers;
