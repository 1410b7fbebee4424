// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::queue_item::{
    HistoryMode, QueueItem, QueueItemPatch, QueueStatus, RetryChange,
};
use crate::domain::repositories::queue_repository::{ItemOrder, QueueItemFilter, QueueRepository};
use crate::queue::category_guard::CategoryGuard;
use crate::queue::work_queue::{ClaimRequest, QueueError};
use chrono::{DateTime, FixedOffset, Utc};
use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 比较并更新失败后的最大重读次数
const MAX_CAS_ATTEMPTS: usize = 5;

/// 状态迁移器
///
/// 所有对单个队列项的修改都经过这里：先读取前像，检查终态，
/// 再以比较并更新写入。完成带分类的队列项时按创建顺序释放
/// 同分类中最早的 hold 项。
pub struct StatusTransitioner<R: QueueRepository> {
    repository: Arc<R>,
    guard: CategoryGuard<R>,
}

impl<R: QueueRepository> StatusTransitioner<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            guard: CategoryGuard::new(repository.clone()),
            repository,
        }
    }

    /// 对选择器匹配的第一个队列项应用补丁
    ///
    /// 前像已完成时原样返回；前像已失败时，重复的失败上报原样返回，
    /// 其他迁移返回 `AlreadyTerminal`。
    ///
    /// # 返回值
    ///
    /// * `Ok(QueueItem)` - 写入后的队列项（或未改动的终态队列项）
    /// * `Err(QueueError::NotFound)` - 没有匹配的队列项
    pub async fn transition_one(
        &self,
        selector: &QueueItemFilter,
        patch: &QueueItemPatch,
    ) -> Result<QueueItem, QueueError> {
        let (item, _) = self.apply_transition(selector, patch).await?;
        Ok(item)
    }

    /// 批量迁移非顺序队列项
    ///
    /// 终态队列项和带分类的队列项永远不会被选中。`require_match` 为真且
    /// 没有任何队列项被修改时返回 `NoMatch`。
    pub async fn transition_many(
        &self,
        selector: &QueueItemFilter,
        patch: &QueueItemPatch,
        require_match: bool,
    ) -> Result<u64, QueueError> {
        let mut filter = selector.clone();
        filter.sequential = Some(false);

        let mut excluded = filter.exclude_statuses.take().unwrap_or_default();
        for status in QueueStatus::TERMINAL {
            if !excluded.contains(&status) {
                excluded.push(status);
            }
        }
        filter.exclude_statuses = Some(excluded);

        let changed = self.repository.update_many(&filter, patch).await?;
        if changed == 0 && require_match {
            return Err(QueueError::NoMatch);
        }

        debug!("Bulk transition changed {} queue items", changed);
        Ok(changed)
    }

    /// 领取下一个可执行的队列项
    ///
    /// 按 immediate 优先、创建时间升序选出第一个 new 项，并原子地切换为
    /// 请求的执行中状态。
    pub async fn claim(&self, request: &ClaimRequest) -> Result<Option<QueueItem>, QueueError> {
        if !request.claim_status.is_in_flight() {
            return Err(QueueError::Validation(format!(
                "claimStatus must be one of on_flight, sent, processing, got {}",
                request.claim_status
            )));
        }

        let filter = QueueItemFilter {
            statuses: Some(vec![QueueStatus::New]),
            destination: request.destination.clone(),
            action: request.action.clone(),
            ..Default::default()
        };

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(candidate) = self.repository.find_one(&filter, ItemOrder::Claim).await? else {
                return Ok(None);
            };

            let now: DateTime<FixedOffset> = Utc::now().into();
            let patch = QueueItemPatch {
                status: Some(request.claim_status),
                flight_at: Some(Some(now)),
                history: HistoryMode::PostImage,
                ..Default::default()
            };

            if let Some(claimed) = self.repository.compare_and_update(&candidate, &patch).await? {
                debug!("Queue item {} claimed as {}", claimed.id, claimed.status);
                counter!("queue_items_claimed_total").increment(1);
                return Ok(Some(claimed));
            }
        }

        warn!("Claim gave up after {} contended attempts", MAX_CAS_ATTEMPTS);
        Ok(None)
    }

    /// 上报开始处理（on_flight/sent → processing）
    pub async fn mark_processing(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        let mut statuses = QueueStatus::IN_FLIGHT.to_vec();
        statuses.extend(QueueStatus::TERMINAL);

        let selector = QueueItemFilter {
            statuses: Some(statuses),
            ..QueueItemFilter::by_id(id)
        };
        let patch = QueueItemPatch {
            history: HistoryMode::PostImage,
            ..QueueItemPatch::status(QueueStatus::Processing)
        };
        let result = self.transition_one(&selector, &patch).await;

        if let Err(QueueError::NotFound(_)) = &result {
            if self.repository.find_by_id(id).await?.is_some() {
                return Err(QueueError::Validation(format!(
                    "queue item {} has not been claimed",
                    id
                )));
            }
        }
        result
    }

    /// 上报完成
    ///
    /// 重复上报不会报错，返回 `false`。带分类的队列项完成后释放
    /// 同分类中最早的 hold 项。
    pub async fn mark_completed(&self, id: Uuid) -> Result<bool, QueueError> {
        let now: DateTime<FixedOffset> = Utc::now().into();
        let patch = QueueItemPatch {
            status: Some(QueueStatus::Completed),
            completed_at: Some(Some(now)),
            history: HistoryMode::PostImage,
            ..Default::default()
        };

        let (item, applied) = self
            .apply_transition(&QueueItemFilter::by_id(id), &patch)
            .await?;
        if !applied {
            debug!("Queue item {} was already completed", id);
            return Ok(false);
        }

        info!("Queue item {} completed", id);
        counter!("queue_items_completed_total").increment(1);

        if let Some(category) = item.category() {
            self.release_next(category, item.id).await?;
        }
        Ok(true)
    }

    /// 上报失败，记录错误信息
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error_details: serde_json::Value,
    ) -> Result<QueueItem, QueueError> {
        let patch = QueueItemPatch {
            status: Some(QueueStatus::Failed),
            error_details: Some(Some(error_details)),
            history: HistoryMode::PostImage,
            ..Default::default()
        };

        let (item, applied) = self
            .apply_transition(&QueueItemFilter::by_id(id), &patch)
            .await?;
        if applied {
            warn!("Queue item {} failed", id);
            counter!("queue_items_failed_total").increment(1);
        }
        Ok(item)
    }

    /// 人工重置重试次数
    ///
    /// 队列项回到 new；所在分类已有其他活跃项时回到 hold。
    pub async fn reset_retries(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(id).await?;
            if current.status.is_terminal() {
                return Err(QueueError::AlreadyTerminal(current.id, current.status));
            }

            let status = match current.category() {
                Some(category) => {
                    if self.guard.acquire(category, current.id).await? {
                        QueueStatus::New
                    } else {
                        QueueStatus::Hold
                    }
                }
                None => QueueStatus::New,
            };

            let patch = QueueItemPatch {
                status: Some(status),
                retry: RetryChange::Reset,
                history: HistoryMode::PreImage,
                ..Default::default()
            };
            if let Some(updated) = self.repository.compare_and_update(&current, &patch).await? {
                info!(
                    "Queue item {} retries reset by operator, now {}",
                    updated.id, updated.status
                );
                return Ok(updated);
            }
        }

        Err(QueueError::Contention(id))
    }

    pub async fn get(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// 重试次数已达上限的队列项，自动清理不会再处理它们
    ///
    /// 包括卡在执行中的队列项，以及在分类中等待、无法再被清理提升的 hold 项。
    pub async fn list_retry_exhausted(
        &self,
        retry_cap: i32,
        limit: u64,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let in_flight = QueueItemFilter {
            statuses: Some(QueueStatus::IN_FLIGHT.to_vec()),
            retry_at_least: Some(retry_cap),
            ..Default::default()
        };
        let held = QueueItemFilter {
            statuses: Some(vec![QueueStatus::Hold]),
            sequential: Some(true),
            retry_at_least: Some(retry_cap),
            ..Default::default()
        };

        let mut items = self
            .repository
            .find_many(&in_flight, ItemOrder::Creation, Some(limit))
            .await?;
        items.extend(
            self.repository
                .find_many(&held, ItemOrder::Creation, Some(limit))
                .await?,
        );

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items.truncate(limit as usize);
        Ok(items)
    }

    pub async fn status_counts(&self) -> Result<BTreeMap<QueueStatus, u64>, QueueError> {
        let mut counts = BTreeMap::new();
        for status in QueueStatus::ALL {
            let filter = QueueItemFilter {
                statuses: Some(vec![status]),
                ..Default::default()
            };
            counts.insert(status, self.repository.count(&filter).await?);
        }
        Ok(counts)
    }

    async fn apply_transition(
        &self,
        selector: &QueueItemFilter,
        patch: &QueueItemPatch,
    ) -> Result<(QueueItem, bool), QueueError> {
        let mut last_seen = None;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.repository.find_one(selector, ItemOrder::Creation).await? else {
                return Err(QueueError::NotFound(describe(selector)));
            };

            match current.status {
                QueueStatus::Completed => return Ok((current, false)),
                QueueStatus::Failed if patch.status == Some(QueueStatus::Failed) => {
                    return Ok((current, false))
                }
                QueueStatus::Failed => {
                    return Err(QueueError::AlreadyTerminal(current.id, current.status))
                }
                _ => {}
            }

            if let Some(updated) = self.repository.compare_and_update(&current, patch).await? {
                return Ok((updated, true));
            }
            last_seen = Some(current.id);
        }

        Err(QueueError::Contention(last_seen.unwrap_or_default()))
    }

    /// 释放分类中最早的 hold 项
    ///
    /// 没有 hold 项时删除 `finished` 持有的标记。
    async fn release_next(
        &self,
        category: &str,
        finished: Uuid,
    ) -> Result<Option<QueueItem>, QueueError> {
        let filter = QueueItemFilter {
            category: Some(category.to_string()),
            statuses: Some(vec![QueueStatus::Hold]),
            ..Default::default()
        };

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(next) = self.repository.find_one(&filter, ItemOrder::Creation).await? else {
                self.guard.release(category, finished).await?;
                debug!("Category {} drained", category);
                return Ok(None);
            };

            if !self.guard.acquire(category, next.id).await? {
                debug!(
                    "Category {} already has an active item, {} stays on hold",
                    category, next.id
                );
                return Ok(None);
            }

            let patch = QueueItemPatch::status(QueueStatus::New);
            if let Some(released) = self.repository.compare_and_update(&next, &patch).await? {
                info!("Released queue item {} in category {}", released.id, category);
                counter!("queue_sequential_promotions_total").increment(1);
                return Ok(Some(released));
            }
        }

        warn!("Releasing the next item in category {} kept conflicting", category);
        Ok(None)
    }
}

fn describe(selector: &QueueItemFilter) -> String {
    match selector.ids.as_deref() {
        Some([id]) => id.to_string(),
        _ => "no queue item matches the selector".to_string(),
    }
}
