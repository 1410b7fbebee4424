// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::queue_item::{QueueItem, QueueItemPatch, QueueStatus};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 存储的数据无法解析
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// 队列项选择器
///
/// 所有字段之间为 AND 关系，`None` 表示不限制。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct QueueItemFilter {
    pub ids: Option<Vec<Uuid>>,
    pub exclude_id: Option<Uuid>,
    pub statuses: Option<Vec<QueueStatus>>,
    pub exclude_statuses: Option<Vec<QueueStatus>>,
    pub action: Option<String>,
    pub event: Option<String>,
    pub destination: Option<String>,
    /// `Some(true)`：带分类的顺序项；`Some(false)`：非顺序且无分类
    pub sequential: Option<bool>,
    pub category: Option<String>,
    /// `flight_at` 早于该时间；没有 `flight_at` 时按 `updated_at` 判断
    pub flight_before: Option<DateTime<FixedOffset>>,
    pub updated_before: Option<DateTime<FixedOffset>>,
    /// `no_of_retry` 严格小于该值
    pub retry_below: Option<i32>,
    /// `no_of_retry` 大于等于该值
    pub retry_at_least: Option<i32>,
}

impl QueueItemFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            ids: Some(vec![id]),
            ..Default::default()
        }
    }

    /// 分类内的活跃项（不含终态与 hold）
    pub fn active_in_category(category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            exclude_statuses: Some(QueueStatus::INACTIVE.to_vec()),
            ..Default::default()
        }
    }

    /// 分类内的非终态项（含 hold）
    pub fn pending_in_category(category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            exclude_statuses: Some(QueueStatus::TERMINAL.to_vec()),
            ..Default::default()
        }
    }
}

/// 扫描顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemOrder {
    /// 按创建时间升序（分类内 FIFO）
    #[default]
    Creation,
    /// 领取顺序：immediate 优先，其次按创建时间
    Claim,
}

/// 顺序分类的活跃标记
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMarker {
    pub category: String,
    pub item_id: Uuid,
    pub updated_at: DateTime<FixedOffset>,
}

/// 队列存储特质
///
/// 只提供原子的单文档比较并更新、批量更新、过滤扫描以及分类标记的
/// 比较并交换原语。排序与不变量相关的规则全部由调用方实现。
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// 插入新队列项
    async fn insert(&self, item: &QueueItem) -> Result<QueueItem, RepositoryError>;
    /// 根据ID查找
    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueItem>, RepositoryError>;
    /// 查找第一个匹配项
    async fn find_one(
        &self,
        filter: &QueueItemFilter,
        order: ItemOrder,
    ) -> Result<Option<QueueItem>, RepositoryError>;
    /// 查找匹配项
    async fn find_many(
        &self,
        filter: &QueueItemFilter,
        order: ItemOrder,
        limit: Option<u64>,
    ) -> Result<Vec<QueueItem>, RepositoryError>;
    /// 统计匹配数量
    async fn count(&self, filter: &QueueItemFilter) -> Result<u64, RepositoryError>;
    /// 比较并更新
    ///
    /// 仅当存储中的版本号仍等于 `current.revision` 时写入，返回写入后的文档；
    /// 版本号已变化时返回 `None`。
    async fn compare_and_update(
        &self,
        current: &QueueItem,
        patch: &QueueItemPatch,
    ) -> Result<Option<QueueItem>, RepositoryError>;
    /// 批量更新，返回实际修改的数量
    async fn update_many(
        &self,
        filter: &QueueItemFilter,
        patch: &QueueItemPatch,
    ) -> Result<u64, RepositoryError>;

    /// 查找分类标记
    async fn find_marker(&self, category: &str) -> Result<Option<CategoryMarker>, RepositoryError>;
    /// 列出持有标记的队列项
    async fn list_markers(&self) -> Result<Vec<CategoryMarker>, RepositoryError>;
    /// 标记不存在时创建，返回是否创建成功
    async fn insert_marker(&self, category: &str, item_id: Uuid) -> Result<bool, RepositoryError>;
    /// 标记持有者等于 `expected` 时替换为 `item_id`
    async fn swap_marker(
        &self,
        category: &str,
        expected: Uuid,
        item_id: Uuid,
    ) -> Result<bool, RepositoryError>;
    /// 标记持有者等于 `expected` 时删除
    async fn delete_marker(&self, category: &str, expected: Uuid) -> Result<bool, RepositoryError>;
}
