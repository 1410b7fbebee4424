// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 负责队列项的准入、状态迁移和分类顺序控制
pub mod category_guard;
pub mod enqueuer;
pub mod transitioner;
pub mod work_queue;

pub use work_queue::{ClaimRequest, QueueError, QueueService, WorkQueue};
