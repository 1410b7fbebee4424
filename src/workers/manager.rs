// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::repositories::queue_repository::QueueRepository;
use crate::workers::sequential_cleaner::{SequentialCleaner, SequentialConfig};
use crate::workers::staleness_sweeper::{StalenessConfig, StalenessSweeper};
use crate::workers::worker::{spawn_worker, Worker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// 工作管理器
///
/// 持有两个清理工作器的后台任务，收到关闭信号时统一中止。
pub struct WorkerManager<R>
where
    R: QueueRepository + 'static,
{
    repository: Arc<R>,
    settings: Settings,
    handles: Vec<JoinHandle<()>>,
}

impl<R> WorkerManager<R>
where
    R: QueueRepository + 'static,
{
    pub fn new(repository: Arc<R>, settings: Settings) -> Self {
        Self {
            repository,
            settings,
            handles: Vec::new(),
        }
    }

    /// 启动配置中启用的工作器
    pub fn start_workers(&mut self) {
        let mut workers: Vec<Arc<dyn Worker>> = Vec::new();

        if self.settings.staleness.enabled {
            workers.push(Arc::new(StalenessSweeper::new(
                self.repository.clone(),
                StalenessConfig::from(&self.settings.staleness),
            )));
        }
        if self.settings.sequential.enabled {
            workers.push(Arc::new(SequentialCleaner::new(
                self.repository.clone(),
                SequentialConfig::from(&self.settings.sequential),
            )));
        }

        for worker in workers {
            info!("Starting worker {}", worker.name());
            self.handles.push(spawn_worker(worker));
        }
    }

    /// 正在运行的工作器数量
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// 中止所有工作器
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Workers shut down successfully");
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
