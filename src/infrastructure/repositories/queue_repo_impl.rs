// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::queue_item::{
    DomainError, HistoryEntry, QueueItem, QueueItemPatch, RetryChange,
};
use crate::domain::repositories::queue_repository::{
    CategoryMarker, ItemOrder, QueueItemFilter, QueueRepository, RepositoryError,
};
use crate::infrastructure::database::entities::queue_item as item_entity;
use crate::infrastructure::database::entities::sequential_category_marker as marker_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 队列仓库实现
///
/// 基于SeaORM实现的队列存储。单文档的原子性依赖 `revision` 列：
/// 每次写入都带上 `WHERE id = ? AND revision = ?` 并将版本号加一。
#[derive(Clone)]
pub struct QueueRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl QueueRepositoryImpl {
    /// 创建新的队列仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<item_entity::Model> for QueueItem {
    type Error = RepositoryError;

    fn try_from(model: item_entity::Model) -> Result<Self, Self::Error> {
        let id = model.id;
        let corrupted = |field: &str, err: String| {
            RepositoryError::Corrupted(format!("queue item {} {}: {}", id, field, err))
        };

        let history: Vec<HistoryEntry> = serde_json::from_value(model.history.clone())
            .map_err(|e| corrupted("history", e.to_string()))?;

        Ok(Self {
            id,
            status: model
                .status
                .parse()
                .map_err(|e: DomainError| corrupted("status", e.to_string()))?,
            priority: model
                .priority
                .parse()
                .map_err(|e: DomainError| corrupted("priority", e.to_string()))?,
            action: model.action,
            event: model.event,
            destination: model.destination,
            params: model.params,
            is_sequential: model.is_sequential,
            sequential_category: model.sequential_category,
            no_of_retry: model.no_of_retry,
            flight_at: model.flight_at,
            completed_at: model.completed_at,
            error_details: model.error_details,
            history,
            revision: model.revision,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<&QueueItem> for item_entity::ActiveModel {
    type Error = RepositoryError;

    fn try_from(item: &QueueItem) -> Result<Self, Self::Error> {
        let history = serde_json::to_value(&item.history)
            .map_err(|e| RepositoryError::Corrupted(format!("queue item {} history: {}", item.id, e)))?;

        Ok(Self {
            id: Set(item.id),
            action: Set(item.action.clone()),
            event: Set(item.event.clone()),
            destination: Set(item.destination.clone()),
            params: Set(item.params.clone()),
            priority: Set(item.priority.to_string()),
            status: Set(item.status.to_string()),
            is_sequential: Set(item.is_sequential),
            sequential_category: Set(item.sequential_category.clone()),
            no_of_retry: Set(item.no_of_retry),
            flight_at: Set(item.flight_at),
            completed_at: Set(item.completed_at),
            error_details: Set(item.error_details.clone()),
            history: Set(history),
            revision: Set(item.revision),
            created_at: Set(item.created_at),
            updated_at: Set(item.updated_at),
        })
    }
}

impl From<marker_entity::Model> for CategoryMarker {
    fn from(model: marker_entity::Model) -> Self {
        Self {
            category: model.category,
            item_id: model.item_id,
            updated_at: model.updated_at,
        }
    }
}

/// 将选择器转换为查询条件
fn condition(filter: &QueueItemFilter) -> Condition {
    use item_entity::Column;

    let mut cond = Condition::all();

    if let Some(ids) = &filter.ids {
        cond = cond.add(Column::Id.is_in(ids.iter().copied()));
    }
    if let Some(id) = filter.exclude_id {
        cond = cond.add(Column::Id.ne(id));
    }
    if let Some(statuses) = &filter.statuses {
        cond = cond.add(Column::Status.is_in(statuses.iter().map(|s| s.to_string())));
    }
    if let Some(statuses) = &filter.exclude_statuses {
        cond = cond.add(Column::Status.is_not_in(statuses.iter().map(|s| s.to_string())));
    }
    if let Some(action) = &filter.action {
        cond = cond.add(Column::Action.eq(action.as_str()));
    }
    if let Some(event) = &filter.event {
        cond = cond.add(Column::Event.eq(event.as_str()));
    }
    if let Some(destination) = &filter.destination {
        cond = cond.add(Column::Destination.eq(destination.as_str()));
    }
    match filter.sequential {
        Some(true) => {
            cond = cond
                .add(Column::SequentialCategory.is_not_null())
                .add(Column::SequentialCategory.ne(""));
        }
        Some(false) => {
            cond = cond
                .add(Column::IsSequential.eq(false))
                .add(Column::SequentialCategory.is_null());
        }
        None => {}
    }
    if let Some(category) = &filter.category {
        cond = cond.add(Column::SequentialCategory.eq(category.as_str()));
    }
    if let Some(threshold) = filter.flight_before {
        cond = cond.add(
            Condition::any()
                .add(Column::FlightAt.lt(threshold))
                .add(
                    Condition::all()
                        .add(Column::FlightAt.is_null())
                        .add(Column::UpdatedAt.lt(threshold)),
                ),
        );
    }
    if let Some(threshold) = filter.updated_before {
        cond = cond.add(Column::UpdatedAt.lt(threshold));
    }
    if let Some(cap) = filter.retry_below {
        cond = cond.add(Column::NoOfRetry.lt(cap));
    }
    if let Some(cap) = filter.retry_at_least {
        cond = cond.add(Column::NoOfRetry.gte(cap));
    }

    cond
}

fn ordered(select: Select<item_entity::Entity>, order: ItemOrder) -> Select<item_entity::Entity> {
    use item_entity::Column;

    match order {
        ItemOrder::Creation => select
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id),
        // "immediate" sorts before "regular"
        ItemOrder::Claim => select
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id),
    }
}

#[async_trait]
impl QueueRepository for QueueRepositoryImpl {
    async fn insert(&self, item: &QueueItem) -> Result<QueueItem, RepositoryError> {
        let model = item_entity::ActiveModel::try_from(item)?;

        item_entity::Entity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(item.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueItem>, RepositoryError> {
        item_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(QueueItem::try_from)
            .transpose()
    }

    async fn find_one(
        &self,
        filter: &QueueItemFilter,
        order: ItemOrder,
    ) -> Result<Option<QueueItem>, RepositoryError> {
        ordered(item_entity::Entity::find().filter(condition(filter)), order)
            .one(self.db.as_ref())
            .await?
            .map(QueueItem::try_from)
            .transpose()
    }

    async fn find_many(
        &self,
        filter: &QueueItemFilter,
        order: ItemOrder,
        limit: Option<u64>,
    ) -> Result<Vec<QueueItem>, RepositoryError> {
        let mut query = ordered(item_entity::Entity::find().filter(condition(filter)), order);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(QueueItem::try_from)
            .collect()
    }

    async fn count(&self, filter: &QueueItemFilter) -> Result<u64, RepositoryError> {
        let count = item_entity::Entity::find()
            .filter(condition(filter))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn compare_and_update(
        &self,
        current: &QueueItem,
        patch: &QueueItemPatch,
    ) -> Result<Option<QueueItem>, RepositoryError> {
        let next = current.apply(patch, Utc::now().into());
        let model = item_entity::ActiveModel::try_from(&next)?;

        let result = item_entity::Entity::update_many()
            .set(model)
            .filter(item_entity::Column::Id.eq(current.id))
            .filter(item_entity::Column::Revision.eq(current.revision))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 1 {
            Ok(Some(next))
        } else {
            debug!(
                "Queue item {} changed since revision {}, update skipped",
                current.id, current.revision
            );
            Ok(None)
        }
    }

    async fn update_many(
        &self,
        filter: &QueueItemFilter,
        patch: &QueueItemPatch,
    ) -> Result<u64, RepositoryError> {
        use item_entity::Column;

        // History is derived from each document, so apply document by document.
        if patch.needs_document() {
            let items = self.find_many(filter, ItemOrder::Creation, None).await?;
            let mut updated = 0;
            for item in &items {
                if self.compare_and_update(item, patch).await?.is_some() {
                    updated += 1;
                }
            }
            return Ok(updated);
        }

        let now: DateTime<FixedOffset> = Utc::now().into();
        let mut update = item_entity::Entity::update_many()
            .col_expr(Column::Revision, Expr::col(Column::Revision).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(status) = patch.status {
            update = update.col_expr(Column::Status, Expr::value(status.to_string()));
        }
        if let Some(priority) = patch.priority {
            update = update.col_expr(Column::Priority, Expr::value(priority.to_string()));
        }
        if let Some(flight_at) = patch.flight_at {
            update = update.col_expr(Column::FlightAt, Expr::value(flight_at));
        }
        if let Some(completed_at) = patch.completed_at {
            update = update.col_expr(Column::CompletedAt, Expr::value(completed_at));
        }
        if let Some(error_details) = &patch.error_details {
            update = update.col_expr(Column::ErrorDetails, Expr::value(error_details.clone()));
        }
        match patch.retry {
            RetryChange::Keep => {}
            RetryChange::Increment => {
                update = update.col_expr(Column::NoOfRetry, Expr::col(Column::NoOfRetry).add(1));
            }
            RetryChange::Reset => {
                update = update.col_expr(Column::NoOfRetry, Expr::value(0));
            }
        }

        let result = update
            .filter(condition(filter))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn find_marker(&self, category: &str) -> Result<Option<CategoryMarker>, RepositoryError> {
        let marker = marker_entity::Entity::find_by_id(category.to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(marker.map(Into::into))
    }

    async fn list_markers(&self) -> Result<Vec<CategoryMarker>, RepositoryError> {
        let markers = marker_entity::Entity::find()
            .order_by_asc(marker_entity::Column::Category)
            .all(self.db.as_ref())
            .await?;
        Ok(markers.into_iter().map(Into::into).collect())
    }

    async fn insert_marker(&self, category: &str, item_id: Uuid) -> Result<bool, RepositoryError> {
        let model = marker_entity::ActiveModel {
            category: Set(category.to_string()),
            item_id: Set(item_id),
            updated_at: Set(Utc::now().into()),
        };

        let inserted = marker_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(marker_entity::Column::Category)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(inserted == 1)
    }

    async fn swap_marker(
        &self,
        category: &str,
        expected: Uuid,
        item_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();
        let result = marker_entity::Entity::update_many()
            .col_expr(marker_entity::Column::ItemId, Expr::value(item_id))
            .col_expr(marker_entity::Column::UpdatedAt, Expr::value(now))
            .filter(marker_entity::Column::Category.eq(category))
            .filter(marker_entity::Column::ItemId.eq(expected))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn delete_marker(&self, category: &str, expected: Uuid) -> Result<bool, RepositoryError> {
        let result = marker_entity::Entity::delete_many()
            .filter(marker_entity::Column::Category.eq(category))
            .filter(marker_entity::Column::ItemId.eq(expected))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
#[path = "queue_repo_impl_test.rs"]
mod tests;
