// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::StalenessSettings;
use crate::domain::models::queue_item::{QueueItemPatch, QueuePriority, QueueStatus};
use crate::domain::repositories::queue_repository::{
    QueueItemFilter, QueueRepository, RepositoryError,
};
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 超时恢复配置
#[derive(Debug, Clone)]
pub struct StalenessConfig {
    pub interval: Duration,
    pub timeout: chrono::Duration,
    pub retry_cap: i32,
}

impl From<&StalenessSettings> for StalenessConfig {
    fn from(settings: &StalenessSettings) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
            retry_cap: settings.retry_cap,
        }
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self::from(&StalenessSettings::default())
    }
}

/// 超时恢复工作器
///
/// 周期性地把卡在执行中状态的非顺序队列项放回 new。
/// 批量更新在写入时重新求值过滤条件，多个实例同时运行也不会重复累加重试次数。
pub struct StalenessSweeper<R>
where
    R: QueueRepository + 'static,
{
    repository: Arc<R>,
    config: StalenessConfig,
}

impl<R> StalenessSweeper<R>
where
    R: QueueRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: StalenessConfig) -> Self {
        Self { repository, config }
    }

    /// 恢复一次超时的队列项
    ///
    /// # 参数
    ///
    /// * `timeout` - 领取后超过该时长视为卡住
    /// * `retry_cap` - 重试次数达到该值的队列项不再自动恢复
    ///
    /// # 返回值
    ///
    /// 被恢复的队列项数量
    pub async fn sweep(
        &self,
        timeout: chrono::Duration,
        retry_cap: i32,
    ) -> Result<u64, RepositoryError> {
        let filter = QueueItemFilter {
            sequential: Some(false),
            statuses: Some(QueueStatus::IN_FLIGHT.to_vec()),
            flight_before: Some((Utc::now() - timeout).into()),
            retry_below: Some(retry_cap),
            ..Default::default()
        };
        let patch = QueueItemPatch {
            priority: Some(QueuePriority::Regular),
            ..QueueItemPatch::recovery(QueueStatus::New)
        };

        let recovered = self.repository.update_many(&filter, &patch).await?;
        if recovered > 0 {
            info!("Recovered {} stale queue items", recovered);
            counter!("queue_items_recovered_total", "sweeper" => "staleness").increment(recovered);
        }
        Ok(recovered)
    }

    /// 使用配置中的超时和上限执行一次
    pub async fn sweep_once(&self) -> Result<u64, RepositoryError> {
        self.sweep(self.config.timeout, self.config.retry_cap).await
    }
}

#[async_trait]
impl<R> Worker for StalenessSweeper<R>
where
    R: QueueRepository + 'static,
{
    async fn run(&self) -> Result<(), WorkerError> {
        info!(
            "Staleness sweeper started (timeout {} min, retry cap {})",
            self.config.timeout.num_minutes(),
            self.config.retry_cap
        );

        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Staleness sweep failed: {}", e);
            }
        }
    }

    fn name(&self) -> &str {
        "staleness-sweeper"
    }
}

#[cfg(test)]
#[path = "staleness_sweeper_test.rs"]
mod tests;
