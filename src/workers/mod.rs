// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台任务处理和生命周期管理
/// 包括自动快照工作器和统一启停的管理器
pub mod manager;
pub mod snapshot_worker;

pub use manager::WorkerManager;
