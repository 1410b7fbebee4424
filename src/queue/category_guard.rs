// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::queue_repository::{QueueRepository, RepositoryError};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MAX_ACQUIRE_ATTEMPTS: usize = 5;

/// 顺序分类守卫
///
/// 每个分类在标记表中最多有一行，记录当前持有活跃名额的队列项。
/// 所有写入都是比较并交换，因此并发的入队、完成与清理之间
/// 不会出现同一分类两个活跃项的情况。
pub struct CategoryGuard<R: QueueRepository> {
    repository: Arc<R>,
}

impl<R: QueueRepository> Clone for CategoryGuard<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: QueueRepository> CategoryGuard<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// 尝试让 `item_id` 成为分类的活跃项
    ///
    /// 标记不存在时直接创建；标记的持有者已进入终态或已不存在时接管标记。
    /// 持有者处于 hold 时视为正在被提升，不可接管。
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - `item_id` 持有标记
    /// * `Ok(false)` - 分类中存在其他活跃项
    pub async fn acquire(&self, category: &str, item_id: Uuid) -> Result<bool, RepositoryError> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            if self.repository.insert_marker(category, item_id).await? {
                return Ok(true);
            }

            let Some(marker) = self.repository.find_marker(category).await? else {
                // Released between the insert and the read
                continue;
            };

            if marker.item_id == item_id {
                return Ok(true);
            }

            let holder = self.repository.find_by_id(marker.item_id).await?;
            let holder_done = holder.map(|h| h.status.is_terminal()).unwrap_or(true);
            if !holder_done {
                return Ok(false);
            }

            if self
                .repository
                .swap_marker(category, marker.item_id, item_id)
                .await?
            {
                debug!(
                    "Category {} taken over from finished item {} by {}",
                    category, marker.item_id, item_id
                );
                return Ok(true);
            }
        }

        debug!("Category {} still contended, {} not admitted", category, item_id);
        Ok(false)
    }

    /// 释放 `holder` 持有的标记，持有者已变化时不做任何事
    pub async fn release(&self, category: &str, holder: Uuid) -> Result<bool, RepositoryError> {
        self.repository.delete_marker(category, holder).await
    }

    /// 将标记从 `holder` 移交给 `next`
    pub async fn hand_over(
        &self,
        category: &str,
        holder: Uuid,
        next: Uuid,
    ) -> Result<bool, RepositoryError> {
        self.repository.swap_marker(category, holder, next).await
    }
}

#[cfg(test)]
#[path = "category_guard_test.rs"]
mod tests;
