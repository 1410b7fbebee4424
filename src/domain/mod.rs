// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：队列项及其状态、优先级、补丁
/// - 仓库接口（repositories）：队列存储的抽象契约
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
