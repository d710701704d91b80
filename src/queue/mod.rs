// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 三级优先级队列抽象、进程内实现，以及负责饥饿晋升、
/// 超时处理和健康刷新的维护调度器
pub mod memory_queue;
pub mod priority_queue;
pub mod scheduler;
