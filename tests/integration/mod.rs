// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod concurrency_test;
pub mod helpers;
pub mod lifecycle_test;
pub mod recovery_test;
pub mod redis_queue_test;
pub mod repositories;
pub mod scenarios_test;
