// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供领域仓库接口的 SeaORM 实现，以及进程内向量存储
pub mod job_repo_impl;
pub mod memory_vector_store;
pub mod snapshot_repo_impl;
pub mod vector_store_impl;
pub mod worker_repo_impl;
