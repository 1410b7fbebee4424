// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 队列仓库（queue_repository）定义了存储原语，具体实现由基础设施层提供。
pub mod queue_repository;
