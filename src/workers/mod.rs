// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 两个周期性清理工作器及其生命周期管理
pub mod manager;
pub mod sequential_cleaner;
pub mod staleness_sweeper;
pub mod worker;

pub use worker::Worker;
