// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// HTTP 请求与响应的数据传输对象
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 队列项实体与仓库接口
pub mod domain;

/// 基础设施模块
///
/// 数据库连接、仓库实现和指标导出
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 队列模块
///
/// 入队、状态迁移与分类顺序控制
pub mod queue;

/// 工具模块
///
/// 日志初始化与错误类型
pub mod utils;

/// 工作器模块
///
/// 超时恢复与顺序清理两个后台工作器
pub mod workers;
