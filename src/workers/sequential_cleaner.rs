// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SequentialSettings;
use crate::domain::models::queue_item::{QueueItem, QueueItemPatch, QueueStatus};
use crate::domain::repositories::queue_repository::{
    ItemOrder, QueueItemFilter, QueueRepository, RepositoryError,
};
use crate::queue::category_guard::CategoryGuard;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 单次清理最多连续执行的轮数
const MAX_DRAIN_PASSES: usize = 20;

/// 顺序清理配置
#[derive(Debug, Clone)]
pub struct SequentialConfig {
    pub interval: Duration,
    pub stale_timeout: chrono::Duration,
    pub failed_timeout: chrono::Duration,
    pub retry_cap: i32,
    pub batch_limit: u64,
}

impl From<&SequentialSettings> for SequentialConfig {
    fn from(settings: &SequentialSettings) -> Self {
        Self {
            interval: settings.interval(),
            stale_timeout: settings.stale_timeout(),
            failed_timeout: settings.failed_timeout(),
            retry_cap: settings.retry_cap,
            batch_limit: settings.batch_limit,
        }
    }
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self::from(&SequentialSettings::default())
    }
}

/// 单轮清理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// 本轮没有找到任何候选项
    pub is_completed: bool,
    pub candidates: usize,
    /// 状态或分类标记发生变化的候选项数量
    pub changed: usize,
}

/// 顺序清理工作器
///
/// 恢复分类内卡住的队列项。恢复时重新检查分类中是否已有活跃项：
/// 有则降级为 hold，没有才放回 new，保证同分类最多一个活跃项。
pub struct SequentialCleaner<R>
where
    R: QueueRepository + 'static,
{
    repository: Arc<R>,
    guard: CategoryGuard<R>,
    config: SequentialConfig,
}

impl<R> SequentialCleaner<R>
where
    R: QueueRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: SequentialConfig) -> Self {
        Self {
            guard: CategoryGuard::new(repository.clone()),
            repository,
            config,
        }
    }

    /// 执行一轮清理
    ///
    /// # 参数
    ///
    /// * `clean_up_only_failed` - 为真时处理被遗忘的 hold 项和仍持有分类标记的
    ///   失败项（短超时）；否则处理卡在执行中的队列项（长超时）
    /// * `limit` - 本轮最多处理的候选项数量
    pub async fn sweep(
        &self,
        clean_up_only_failed: bool,
        limit: u64,
    ) -> Result<SweepOutcome, RepositoryError> {
        let candidates = if clean_up_only_failed {
            self.failed_candidates(limit).await?
        } else {
            self.stale_candidates(limit).await?
        };

        let mut outcome = SweepOutcome {
            is_completed: candidates.is_empty(),
            candidates: candidates.len(),
            changed: 0,
        };

        let mut resolved: HashSet<String> = HashSet::new();
        for candidate in &candidates {
            if self.resolve(candidate, &mut resolved).await? {
                outcome.changed += 1;
            }
        }

        if outcome.changed > 0 {
            info!(
                "Sequential cleanup ({}) changed {} of {} candidates",
                if clean_up_only_failed { "failed" } else { "stale" },
                outcome.changed,
                outcome.candidates
            );
        }
        Ok(outcome)
    }

    /// 重复执行清理直到没有候选项或不再产生变化
    pub async fn drain(&self, clean_up_only_failed: bool) -> Result<usize, RepositoryError> {
        let mut changed = 0;
        for _ in 0..MAX_DRAIN_PASSES {
            let outcome = self
                .sweep(clean_up_only_failed, self.config.batch_limit)
                .await?;
            changed += outcome.changed;
            if outcome.is_completed || outcome.changed == 0 {
                break;
            }
        }
        Ok(changed)
    }

    async fn stale_candidates(&self, limit: u64) -> Result<Vec<QueueItem>, RepositoryError> {
        let filter = QueueItemFilter {
            sequential: Some(true),
            statuses: Some(QueueStatus::IN_FLIGHT.to_vec()),
            updated_before: Some((Utc::now() - self.config.stale_timeout).into()),
            retry_below: Some(self.config.retry_cap),
            ..Default::default()
        };
        self.repository
            .find_many(&filter, ItemOrder::Creation, Some(limit))
            .await
    }

    async fn failed_candidates(&self, limit: u64) -> Result<Vec<QueueItem>, RepositoryError> {
        let threshold = (Utc::now() - self.config.failed_timeout).into();

        let held = QueueItemFilter {
            sequential: Some(true),
            statuses: Some(vec![QueueStatus::Hold]),
            updated_before: Some(threshold),
            retry_below: Some(self.config.retry_cap),
            ..Default::default()
        };
        let mut candidates = self
            .repository
            .find_many(&held, ItemOrder::Creation, Some(limit))
            .await?;

        let holders: Vec<_> = self
            .repository
            .list_markers()
            .await?
            .into_iter()
            .map(|marker| marker.item_id)
            .collect();
        if !holders.is_empty() {
            let failed = QueueItemFilter {
                ids: Some(holders),
                sequential: Some(true),
                statuses: Some(vec![QueueStatus::Failed]),
                updated_before: Some(threshold),
                ..Default::default()
            };
            candidates.extend(
                self.repository
                    .find_many(&failed, ItemOrder::Creation, Some(limit))
                    .await?,
            );
        }

        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    /// 处理单个候选项，返回是否产生了变化
    async fn resolve(
        &self,
        candidate: &QueueItem,
        resolved: &mut HashSet<String>,
    ) -> Result<bool, RepositoryError> {
        let Some(category) = candidate.category() else {
            return Ok(false);
        };

        if candidate.status == QueueStatus::Failed {
            let released = self.guard.release(category, candidate.id).await?;
            if released {
                info!(
                    "Released category {} held by failed item {}",
                    category, candidate.id
                );
            }
            return Ok(released);
        }

        let sibling = self
            .repository
            .find_one(
                &QueueItemFilter {
                    exclude_id: Some(candidate.id),
                    ..QueueItemFilter::active_in_category(category)
                },
                ItemOrder::Creation,
            )
            .await?;

        let status = if resolved.contains(category) || sibling.is_some() {
            QueueStatus::Hold
        } else if self.guard.acquire(category, candidate.id).await? {
            QueueStatus::New
        } else {
            QueueStatus::Hold
        };

        // A demoted candidate does not settle the category; later candidates
        // re-check the live siblings.
        if status == QueueStatus::New {
            resolved.insert(category.to_string());
        }

        if status == QueueStatus::Hold {
            if let Some(sibling) = &sibling {
                self.guard
                    .hand_over(category, candidate.id, sibling.id)
                    .await?;
            }
        }

        if status == candidate.status {
            debug!(
                "Queue item {} stays {} in category {}",
                candidate.id, status, category
            );
            return Ok(false);
        }

        let Some(updated) = self
            .repository
            .compare_and_update(candidate, &QueueItemPatch::recovery(status))
            .await?
        else {
            return Ok(false);
        };

        match (candidate.status, updated.status) {
            (QueueStatus::Hold, QueueStatus::New) => {
                info!("Promoted held item {} in category {}", updated.id, category);
                counter!("queue_sequential_promotions_total").increment(1);
            }
            (_, QueueStatus::Hold) => {
                info!(
                    "Demoted item {} to hold, category {} already has an active item",
                    updated.id, category
                );
                counter!("queue_sequential_demotions_total").increment(1);
            }
            _ => {
                info!("Recovered stale item {} in category {}", updated.id, category);
                counter!("queue_items_recovered_total", "sweeper" => "sequential").increment(1);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl<R> Worker for SequentialCleaner<R>
where
    R: QueueRepository + 'static,
{
    async fn run(&self) -> Result<(), WorkerError> {
        info!(
            "Sequential cleaner started (stale {} min, failed {} min, retry cap {})",
            self.config.stale_timeout.num_minutes(),
            self.config.failed_timeout.num_minutes(),
            self.config.retry_cap
        );

        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;

            if let Err(e) = self.drain(false).await {
                error!("Sequential stale cleanup failed: {}", e);
            }
            if let Err(e) = self.drain(true).await {
                error!("Sequential failed cleanup failed: {}", e);
            }
        }
    }

    fn name(&self) -> &str {
        "sequential-cleaner"
    }
}

#[cfg(test)]
#[path = "sequential_cleaner_test.rs"]
mod tests;
