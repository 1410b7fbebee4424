// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 周期性后台工作器
///
/// `run` 只在无法继续运行时返回；单轮失败由实现自行记录日志后继续。
#[async_trait]
pub trait Worker: Send + Sync {
    /// 运行工作器
    async fn run(&self) -> Result<(), WorkerError>;

    /// 获取工作器名称
    fn name(&self) -> &str;
}

/// 在独立任务中运行工作器
pub fn spawn_worker<W>(worker: Arc<W>) -> JoinHandle<()>
where
    W: Worker + ?Sized + 'static,
{
    tokio::spawn(async move {
        match worker.run().await {
            Ok(()) => info!("Worker {} stopped", worker.name()),
            Err(e) => error!("Worker {} exited: {}", worker.name(), e),
        }
    })
}
