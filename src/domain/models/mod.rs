// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 队列项（queue_item）是系统中唯一的持久化实体。
pub mod queue_item;
