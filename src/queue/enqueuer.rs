// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::queue_item::{NewQueueItem, QueueItem, QueueItemPatch, QueueStatus};
use crate::domain::repositories::queue_repository::{QueueItemFilter, QueueRepository};
use crate::queue::category_guard::CategoryGuard;
use crate::queue::work_queue::QueueError;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// 入队器
///
/// 负责校验生产者提交的队列项并决定其初始状态。带分类的队列项
/// 先以 hold 写入，拿到分类标记后再提升为 new，因此任何时刻都不会
/// 出现同分类的两个活跃项。
pub struct Enqueuer<R: QueueRepository> {
    repository: Arc<R>,
    guard: CategoryGuard<R>,
}

impl<R: QueueRepository> Enqueuer<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            guard: CategoryGuard::new(repository.clone()),
            repository,
        }
    }

    /// 入队单个队列项
    ///
    /// # 返回值
    ///
    /// * `Ok(QueueItem)` - 已写入的队列项
    /// * `Err(QueueError::Validation)` - 路由字段缺失或负载为空
    pub async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, QueueError> {
        validate(&item)?;
        let mut claimed = HashSet::new();
        self.admit(item, &mut claimed).await
    }

    /// 批量入队
    ///
    /// 先校验全部队列项，任何一项不合法则整批拒绝；之后逐项独立准入，
    /// 中途失败时已写入的队列项保留。
    pub async fn enqueue_many(
        &self,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        validate_all(&items)?;

        let mut admitted = Vec::with_capacity(items.len());
        for item in items {
            let mut claimed = HashSet::new();
            admitted.push(self.admit(item, &mut claimed).await?);
        }

        info!("Enqueued {} queue items", admitted.len());
        Ok(admitted)
    }

    /// 顺序批量入队
    ///
    /// 同一批次内已经占用的分类会被记录，后续同分类的队列项直接进入 hold。
    pub async fn enqueue_sequential(
        &self,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        validate_all(&items)?;

        let mut claimed = HashSet::new();
        let mut admitted = Vec::with_capacity(items.len());
        for item in items {
            admitted.push(self.admit(item, &mut claimed).await?);
        }

        let held = admitted
            .iter()
            .filter(|item| item.status == QueueStatus::Hold)
            .count();
        info!(
            "Enqueued {} sequential queue items ({} on hold)",
            admitted.len(),
            held
        );
        Ok(admitted)
    }

    async fn admit(
        &self,
        new: NewQueueItem,
        claimed: &mut HashSet<String>,
    ) -> Result<QueueItem, QueueError> {
        let category = new
            .sequential_category
            .clone()
            .filter(|category| !category.is_empty());

        let Some(category) = category else {
            let item = self
                .repository
                .insert(&QueueItem::from_new(new, QueueStatus::New))
                .await?;
            record_enqueued(&item);
            return Ok(item);
        };

        let blocked = claimed.contains(&category)
            || self
                .repository
                .count(&QueueItemFilter::pending_in_category(&category))
                .await?
                > 0;

        let item = self
            .repository
            .insert(&QueueItem::from_new(new, QueueStatus::Hold))
            .await?;
        claimed.insert(category.clone());

        if blocked || !self.guard.acquire(&category, item.id).await? {
            debug!("Queue item {} held behind category {}", item.id, category);
            record_enqueued(&item);
            return Ok(item);
        }

        let admitted = match self
            .repository
            .compare_and_update(&item, &QueueItemPatch::status(QueueStatus::New))
            .await?
        {
            Some(admitted) => admitted,
            // Touched by a sweep in between; report what is stored now
            None => self
                .repository
                .find_by_id(item.id)
                .await?
                .ok_or_else(|| QueueError::NotFound(item.id.to_string()))?,
        };

        debug!("Queue item {} is active in category {}", admitted.id, category);
        record_enqueued(&admitted);
        Ok(admitted)
    }
}

fn validate(item: &NewQueueItem) -> Result<(), QueueError> {
    item.validate()
        .map_err(|errors| QueueError::Validation(errors.to_string()))
}

fn validate_all(items: &[NewQueueItem]) -> Result<(), QueueError> {
    if items.is_empty() {
        return Err(QueueError::Validation("batch cannot be empty".to_string()));
    }
    for (index, item) in items.iter().enumerate() {
        item.validate()
            .map_err(|errors| QueueError::Validation(format!("item {}: {}", index, errors)))?;
    }
    Ok(())
}

fn record_enqueued(item: &QueueItem) {
    counter!("queue_items_enqueued_total", "status" => item.status.to_string()).increment(1);
}
